//! Rewriting of matched update-check requests.

use serde_json::Value;

use crate::config::ModifierConfig;
use crate::http::request::OutgoingRequest;
use crate::rewrite::items::{FieldEncoding, UpdateItemSet};
use crate::rewrite::RewriteError;
use crate::routing::{normalize, Category};

/// A user-agent rewrite that took place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentChange {
    pub from: String,
    pub to: String,
}

/// What happened to the request body.
#[derive(Debug)]
pub enum BodyOutcome {
    /// Core checks carry no item set.
    NotApplicable,
    /// The item set was filtered and written back.
    Rewritten {
        removed: Vec<String>,
        removed_active: Vec<String>,
    },
    /// The body was left untouched.
    Skipped(RewriteError),
}

/// Everything the rewriter decided for one request.
#[derive(Debug)]
pub struct RewriteReport {
    pub endpoint: String,
    pub category: Category,
    pub original_url: String,
    pub normalized_url: String,
    pub user_agent: Option<UserAgentChange>,
    pub body: BodyOutcome,
}

/// Applies the configured rewrite to matched requests.
pub struct PayloadRewriter<'a> {
    config: &'a ModifierConfig,
}

impl<'a> PayloadRewriter<'a> {
    pub fn new(config: &'a ModifierConfig) -> Self {
        Self { config }
    }

    /// Rewrite `request` in place; `endpoint` is the matched endpoint.
    pub fn rewrite(&self, request: &mut OutgoingRequest, endpoint: &str) -> RewriteReport {
        let original_url = request.url.clone();
        let category = Category::classify(&original_url);
        let normalized_url = normalize(&original_url, category, &self.config.normalization);
        if self.config.interception.forward_normalized_url {
            request.url = normalized_url.clone();
        }

        let user_agent = self.rewrite_user_agent(request);
        let body = self.rewrite_body(category, request);

        RewriteReport {
            endpoint: endpoint.to_string(),
            category,
            original_url,
            normalized_url,
            user_agent,
            body,
        }
    }

    fn rewrite_user_agent(&self, request: &mut OutgoingRequest) -> Option<UserAgentChange> {
        let site_url = self.config.interception.site_url.trim().trim_end_matches('/');
        if site_url.is_empty() {
            return None;
        }

        let from = request.user_agent()?.to_string();
        let to = from.replace(site_url, &self.config.interception.user_agent_replacement);
        if to == from {
            return None;
        }

        if request.set_user_agent(&to) {
            Some(UserAgentChange { from, to })
        } else {
            tracing::warn!(user_agent = %to, "Rewritten user-agent is not a valid header value");
            None
        }
    }

    fn rewrite_body(&self, category: Category, request: &mut OutgoingRequest) -> BodyOutcome {
        let Some(field) = category.body_field() else {
            return BodyOutcome::NotApplicable;
        };

        match self.filter_items(category, field, request) {
            Ok(outcome) => outcome,
            Err(err) => BodyOutcome::Skipped(err),
        }
    }

    fn filter_items(
        &self,
        category: Category,
        field: &'static str,
        request: &mut OutgoingRequest,
    ) -> Result<BodyOutcome, RewriteError> {
        let fields = request
            .body
            .fields_mut()
            .ok_or(RewriteError::FieldMissing(field))?;
        let raw = fields.get(field).ok_or(RewriteError::FieldMissing(field))?;

        let (decoded, encoding) = FieldEncoding::decode(field, raw)?;
        let mut set = UpdateItemSet::parse(field, decoded)?;

        // A flat plugin set carries its active list in a sibling field.
        let mut active_encoding = None;
        if category == Category::Plugins && !set.is_enveloped() {
            if let Some(raw_active) = fields.get("active") {
                match FieldEncoding::decode("active", raw_active) {
                    Ok((Value::Array(active), enc)) => {
                        set = set.with_active(active);
                        active_encoding = Some(enc);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::debug!(error = %err, "Leaving unparseable active list untouched");
                    }
                }
            }
        }

        let removed = set.strip_alternate_sources(&self.config.interception.alternate_source_field);
        let removed_active = if category == Category::Plugins {
            set.prune_active(&removed)
        } else {
            Vec::new()
        };

        let (items, active) = set.into_parts();
        fields.insert(field.to_string(), encoding.encode(items));
        if let (Some(active), Some(enc)) = (active, active_encoding) {
            fields.insert("active".to_string(), enc.encode(active));
        }

        Ok(BodyOutcome::Rewritten {
            removed,
            removed_active,
        })
    }
}
