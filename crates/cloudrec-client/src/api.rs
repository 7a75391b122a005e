//! API client for the whited rule endpoints
//!
//! Provides typed methods for each `/api/whitedRule` endpoint. Every response
//! is an [`ApiResult`] envelope; any `code` other than the success sentinel is
//! reported as [`ClientError::ServerError`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use cloudrec_api::{
    AggregateGroup, ApiResult, GroupQuery, ListContent, LockStatus, Page, RecordQuery,
    RuleRecord, SaveRuleRecord, WhitedOperator,
};

use crate::error::{ClientError, Result};
use crate::http::CloudRecHttpClient;

const BASE_PATH: &str = "/api/whitedRule";

/// List payload; some server versions return the rows without a wrapper
#[derive(Deserialize)]
#[serde(untagged)]
enum ListPayload<T> {
    Rows(Vec<T>),
    Paged(ListContent<T>),
}

impl<T> ListPayload<T> {
    fn into_page(self, page: u64, size: u64) -> Page<T> {
        match self {
            ListPayload::Rows(data) => ListContent { data, total: 0 }.into_page(page, size),
            ListPayload::Paged(content) => content.into_page(page, size),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EffectData {
    effect_id: i64,
}

/// Unwrap a response envelope, turning a failure code into an error
pub fn into_content<T>(result: ApiResult<T>) -> Result<Option<T>> {
    if result.is_success() {
        Ok(result.content)
    } else {
        Err(ClientError::ServerError {
            code: result.code,
            message: result.message().to_string(),
        })
    }
}

fn missing(what: String) -> ClientError {
    ClientError::ServerError {
        code: 404,
        message: what,
    }
}

/// API client wrapper providing typed access to the whited rule store
pub struct WhitedRuleApiClient {
    http_client: CloudRecHttpClient,
}

impl WhitedRuleApiClient {
    pub fn new(http_client: CloudRecHttpClient) -> Self {
        Self { http_client }
    }

    pub fn http_client(&self) -> &CloudRecHttpClient {
        &self.http_client
    }

    // ============== Lock APIs ==============

    /// Grab the edit lock of a record.
    ///
    /// Older servers answer with a bare success string instead of the lock
    /// status; `None` is returned in that case and the caller re-reads the
    /// record.
    pub async fn grab_lock(&self, id: i64) -> Result<Option<LockStatus>> {
        let response: ApiResult<serde_json::Value> = self
            .http_client
            .post_empty(&format!("{}/grabLock/{}", BASE_PATH, id))
            .await?;
        let content = into_content(response)?;
        let status = content
            .filter(serde_json::Value::is_object)
            .and_then(|v| serde_json::from_value::<LockStatus>(v).ok());
        debug!("grabLock {} answered with lock status {:?}", id, status);
        Ok(status)
    }

    /// Release the edit lock of a record
    pub async fn release_lock(&self, id: i64) -> Result<()> {
        let response: ApiResult<serde_json::Value> = self
            .http_client
            .post_empty(&format!("{}/releaseLock/{}", BASE_PATH, id))
            .await?;
        into_content(response)?;
        Ok(())
    }

    // ============== Query APIs ==============

    /// List records matching `query`
    pub async fn list(&self, query: &RecordQuery, page: u64, size: u64) -> Result<Page<RuleRecord>> {
        #[derive(Serialize)]
        struct Body<'a> {
            #[serde(flatten)]
            query: &'a RecordQuery,
            page: u64,
            size: u64,
        }

        let response: ApiResult<ListPayload<RuleRecord>> = self
            .http_client
            .post_json(
                &format!("{}/list", BASE_PATH),
                &Body { query, page, size },
            )
            .await?;
        Ok(into_content(response)?
            .map(|payload| payload.into_page(page, size))
            .unwrap_or_else(|| Page::new(0, page, size, vec![])))
    }

    /// List one aggregate row per rule code
    pub async fn list_group_by_rule_code(
        &self,
        query: &GroupQuery,
        page: u64,
        size: u64,
    ) -> Result<Page<AggregateGroup>> {
        #[derive(Serialize)]
        struct Body<'a> {
            #[serde(flatten)]
            query: &'a GroupQuery,
            page: u64,
            size: u64,
        }

        let response: ApiResult<ListPayload<AggregateGroup>> = self
            .http_client
            .post_json(
                &format!("{}/listGroupByRuleCode", BASE_PATH),
                &Body { query, page, size },
            )
            .await?;
        Ok(into_content(response)?
            .map(|payload| payload.into_page(page, size))
            .unwrap_or_else(|| Page::new(0, page, size, vec![])))
    }

    /// Operators the server accepts in rule config items
    pub async fn operators(&self) -> Result<Vec<WhitedOperator>> {
        let response: ApiResult<Vec<WhitedOperator>> = self
            .http_client
            .post_empty(&format!("{}/operator", BASE_PATH))
            .await?;
        Ok(into_content(response)?.unwrap_or_default())
    }

    /// Get one record by id
    pub async fn detail(&self, id: i64) -> Result<RuleRecord> {
        let response: ApiResult<RuleRecord> = self
            .http_client
            .get(&format!("{}/{}", BASE_PATH, id))
            .await?;
        into_content(response)?.ok_or_else(|| missing(format!("whited rule {}", id)))
    }

    // ============== Mutation APIs ==============

    /// Enable or disable a record
    pub async fn change_status(&self, id: i64, enabled: bool) -> Result<()> {
        #[derive(Serialize)]
        struct Body {
            id: i64,
            enable: i32,
        }

        let response: ApiResult<serde_json::Value> = self
            .http_client
            .post_json(
                &format!("{}/changeStatus", BASE_PATH),
                &Body {
                    id,
                    enable: if enabled { 1 } else { 0 },
                },
            )
            .await?;
        into_content(response)?;
        Ok(())
    }

    /// Delete a record
    pub async fn delete(&self, id: i64) -> Result<()> {
        let response: ApiResult<serde_json::Value> = self
            .http_client
            .post_empty(&format!("{}/delete/{}", BASE_PATH, id))
            .await?;
        into_content(response)?;
        Ok(())
    }

    /// Create or update a record; returns the affected id
    pub async fn save(&self, form: &SaveRuleRecord) -> Result<i64> {
        let response: ApiResult<EffectData> = self
            .http_client
            .post_json(&format!("{}/save", BASE_PATH), form)
            .await?;
        let effect = into_content(response)?;
        match (effect, form.id) {
            (Some(effect), _) => Ok(effect.effect_id),
            (None, Some(id)) => Ok(id),
            (None, None) => Err(ClientError::Other(anyhow::anyhow!(
                "save succeeded without returning an id"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_content_failure() {
        let result: ApiResult<String> = ApiResult::failure(500, "locked by another user");
        match into_content(result) {
            Err(ClientError::ServerError { code, message }) => {
                assert_eq!(code, 500);
                assert_eq!(message, "locked by another user");
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_into_content_success() {
        let result = ApiResult::success("SUCCESS".to_string());
        assert_eq!(into_content(result).unwrap().as_deref(), Some("SUCCESS"));
    }

    #[test]
    fn test_list_payload_wrapped() {
        let payload: ListPayload<AggregateGroup> = serde_json::from_value(json!({
            "data": [{"ruleCode": "A", "ruleName": "Rule A", "count": 2}],
            "total": 11
        }))
        .unwrap();
        let page = payload.into_page(1, 10);
        assert_eq!(page.total_count, 11);
        assert_eq!(page.pages_available, 2);
        assert_eq!(page.page_items[0].display_name, "Rule A");
    }

    #[test]
    fn test_list_payload_bare_rows() {
        let payload: ListPayload<AggregateGroup> =
            serde_json::from_value(json!([{"ruleCode": "A", "count": 2}])).unwrap();
        let page = payload.into_page(1, 10);
        assert_eq!(page.total_count, 1);
    }

    #[test]
    fn test_effect_data() {
        let effect: EffectData = serde_json::from_value(json!({"effectId": 9})).unwrap();
        assert_eq!(effect.effect_id, 9);
    }

    #[test]
    fn test_group_list_envelope() {
        let result: ApiResult<ListPayload<AggregateGroup>> = serde_json::from_value(json!({
            "code": 200,
            "msg": "success",
            "content": {
                "data": [
                    {"ruleCode": "GLOBAL", "ruleName": "", "count": 3},
                    {"ruleCode": "ECS_PUBLIC_IP", "ruleName": "ECS exposed", "count": 1}
                ],
                "total": 2
            }
        }))
        .unwrap();

        let page = into_content(result).unwrap().unwrap().into_page(1, 10);
        assert_eq!(page.total_count, 2);
        assert!(page.page_items[0].scope().is_global());
        assert_eq!(page.page_items[1].display_name, "ECS exposed");
    }

    #[test]
    fn test_record_list_and_save_envelopes() {
        let result: ApiResult<ListPayload<RuleRecord>> = serde_json::from_value(json!({
            "code": 200,
            "content": [{"id": 5, "ruleCode": "X", "enable": 1, "isLockHolder": false}]
        }))
        .unwrap();
        let page = into_content(result).unwrap().unwrap().into_page(1, 10);
        assert_eq!(page.page_items[0].id, 5);

        let result: ApiResult<EffectData> =
            serde_json::from_value(json!({"code": 200, "content": {"effectId": 12}})).unwrap();
        assert_eq!(into_content(result).unwrap().map(|e| e.effect_id), Some(12));

        let result: ApiResult<EffectData> =
            serde_json::from_value(json!({"code": 500, "msg": "duplicate rule name"})).unwrap();
        assert!(into_content(result).is_err());
    }

    #[test]
    fn test_operator_envelope() {
        let result: ApiResult<Vec<WhitedOperator>> = serde_json::from_value(json!({
            "code": 200,
            "msg": "success",
            "content": ["EQ", "NE", "LIKE", "NOT_LIKE", "IN", "NOT_IN"]
        }))
        .unwrap();
        assert_eq!(
            into_content(result).unwrap().unwrap(),
            WhitedOperator::ALL.to_vec()
        );
    }

    #[test]
    fn test_list_body_shape() {
        #[derive(Serialize)]
        struct Body<'a> {
            #[serde(flatten)]
            query: &'a RecordQuery,
            page: u64,
            size: u64,
        }
        let query = RecordQuery::for_rule_code("GLOBAL_CONFIG").with_rule_name(Some("vpn".into()));
        let body = serde_json::to_value(Body {
            query: &query,
            page: 2,
            size: 20,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({"ruleCode": "GLOBAL_CONFIG", "ruleName": "vpn", "page": 2, "size": 20})
        );
    }
}
