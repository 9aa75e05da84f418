//! The backend trait.

use async_trait::async_trait;
use waypoint_core::api::{MatchResult, RuleCheckRequest, SuggestGetRequest, SuggestNextRequest};
use waypoint_core::rules::RuleListItem;
use waypoint_core::suggestion::Suggestion;

use crate::errors::Result;

/// Rule and suggestion backend.
///
/// One call per method, no retries. Implementations must be cheap to share
/// across tasks.
#[async_trait]
pub trait AssistApi: Send + Sync {
    /// `GET /rule?siteId=`
    async fn list_rules(&self, site_id: &str) -> Result<Vec<RuleListItem>>;

    /// `POST /rule/check`
    async fn check_rule(&self, request: &RuleCheckRequest) -> Result<MatchResult>;

    /// First suggestion batch for a matched rule.
    async fn fetch_suggestions(&self, request: &SuggestGetRequest) -> Result<Vec<Suggestion>>;

    /// `POST /suggest/next` with accumulated choice input.
    async fn next_suggestions(&self, request: &SuggestNextRequest) -> Result<Vec<Suggestion>>;
}
