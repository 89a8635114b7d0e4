use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use msgstore_store::{ArticleStats, PartitionSummary, Rejection, ViewKind};
use serde::{Deserialize, Serialize};

/// Text sent for any failure whose detail must stay server-side.
pub const PROCESSING_ERROR: &str = "Processing error";

/// Body of `POST /msgid`.
///
/// Missing fields deserialize as empty so the store can answer with its own
/// "Missing msgid or body" rejection instead of a decode error.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default, alias = "identifier", alias = "Msgid")]
    pub msgid: String,
    #[serde(default, alias = "Body")]
    pub body: String,
    #[serde(default, alias = "attributes", alias = "Meta")]
    pub meta: Option<BTreeMap<String, String>>,
}

/// Structured answer to every request that does not stream an article.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub accepted: bool,
    pub message: String,
}

impl Reply {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            accepted: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
        }
    }

    pub fn processing_error() -> Self {
        Self::rejected(PROCESSING_ERROR)
    }

    pub fn unsupported_method(method: &str) -> Self {
        Self::rejected(format!("Unsupported HTTP Method={method}"))
    }
}

impl From<&Rejection> for Reply {
    fn from(r: &Rejection) -> Self {
        Self::rejected(r.to_string())
    }
}

/// Query of `GET /msgid`: `?msgid=<id>&type=<HEAD|ARTICLE|BODY>`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveQuery {
    #[serde(default, alias = "identifier")]
    pub msgid: Option<String>,
    #[serde(default, rename = "type", alias = "view")]
    pub view: Option<String>,
}

impl RetrieveQuery {
    /// Check that both parameters are present and the view is a known kind.
    /// An empty value counts as absent.
    pub fn validate(&self) -> Result<(&str, ViewKind), Rejection> {
        let msgid = match self.msgid.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => return Err(Rejection::MissingIdentifier),
        };
        let view = match self.view.as_deref() {
            Some(v) if !v.is_empty() => v,
            _ => return Err(Rejection::MissingView),
        };
        let kind = view.parse().map_err(|_| Rejection::InvalidView)?;
        Ok((msgid, kind))
    }
}

/// Query of `GET /stats`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsQuery {
    #[serde(default, alias = "identifier")]
    pub msgid: Option<String>,
}

/// Usage statistics of one article.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReply {
    pub msgid: String,
    pub partition: String,
    pub read_count: u64,
    pub last_read_ms: u64,
    pub store_age_ms: u64,
    pub attributes: BTreeMap<String, String>,
}

impl StatsReply {
    pub fn new(msgid: &str, stats: ArticleStats) -> Self {
        Self {
            msgid: msgid.to_string(),
            partition: stats.partition,
            read_count: stats.stat.read_count,
            last_read_ms: stats.stat.last_read_ms,
            store_age_ms: stats.stat.store_age_ms,
            attributes: stats.meta.attributes,
        }
    }
}

/// Listing of `GET /partitions`, newest first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionsReply {
    pub partitions: Vec<PartitionEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionEntry {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub articles: usize,
}

impl From<Vec<PartitionSummary>> for PartitionsReply {
    fn from(summaries: Vec<PartitionSummary>) -> Self {
        Self {
            partitions: summaries
                .into_iter()
                .map(|s| PartitionEntry {
                    key: s.key,
                    created_at: s.created_at,
                    articles: s.articles,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use msgstore_store::{ArticleMeta, FileStat};
    use serde_json::json;

    fn query(msgid: Option<&str>, view: Option<&str>) -> RetrieveQuery {
        RetrieveQuery {
            msgid: msgid.map(String::from),
            view: view.map(String::from),
        }
    }

    #[test]
    fn ingest_request_accepts_both_field_spellings() {
        let a: IngestRequest =
            serde_json::from_value(json!({"msgid": "<1@x>", "body": "b", "meta": {"k": "v"}}))
                .unwrap();
        let b: IngestRequest = serde_json::from_value(
            json!({"identifier": "<1@x>", "body": "b", "attributes": {"k": "v"}}),
        )
        .unwrap();
        let c: IngestRequest =
            serde_json::from_value(json!({"Msgid": "<1@x>", "Body": "b", "Meta": {"k": "v"}}))
                .unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn ingest_request_missing_fields_default_to_empty() {
        let r: IngestRequest = serde_json::from_value(json!({"meta": null})).unwrap();
        assert!(r.msgid.is_empty());
        assert!(r.body.is_empty());
        assert!(r.meta.is_none());
    }

    #[test]
    fn reply_shape() {
        let v = serde_json::to_value(Reply::accepted("Saved")).unwrap();
        assert_eq!(v, json!({"accepted": true, "message": "Saved"}));
        assert_eq!(Reply::processing_error().message, "Processing error");
        assert_eq!(
            Reply::unsupported_method("PUT").message,
            "Unsupported HTTP Method=PUT"
        );
        assert!(!Reply::from(&Rejection::MissingField).accepted);
    }

    #[test]
    fn retrieve_query_validation() {
        assert_eq!(
            query(Some("<1@x>"), Some("HEAD")).validate(),
            Ok(("<1@x>", ViewKind::HeadersOnly))
        );
        assert_eq!(
            query(None, Some("HEAD")).validate(),
            Err(Rejection::MissingIdentifier)
        );
        assert_eq!(
            query(Some(""), Some("HEAD")).validate(),
            Err(Rejection::MissingIdentifier)
        );
        assert_eq!(query(Some("<1@x>"), None).validate(), Err(Rejection::MissingView));
        assert_eq!(
            query(Some("<1@x>"), Some("STAT")).validate(),
            Err(Rejection::InvalidView)
        );
        assert_eq!(
            Rejection::InvalidView.to_string(),
            "Type invalid value, valid=[HEAD, ARTICLE, BODY]"
        );
    }

    #[test]
    fn retrieve_query_uses_type_parameter() {
        let q: RetrieveQuery =
            serde_json::from_value(json!({"msgid": "<1@x>", "type": "BODY"})).unwrap();
        assert_eq!(q.validate(), Ok(("<1@x>", ViewKind::BodyOnly)));
    }

    #[test]
    fn stats_reply_flattens_entry() {
        let mut attributes = BTreeMap::new();
        attributes.insert("group".to_string(), "alt.test".to_string());
        let reply = StatsReply::new(
            "<1@x>",
            ArticleStats {
                partition: "2024-06-01".into(),
                stat: FileStat {
                    read_count: 2,
                    last_read_ms: 10,
                    store_age_ms: 5,
                },
                meta: ArticleMeta::new(attributes),
            },
        );
        let v = serde_json::to_value(reply).unwrap();
        assert_eq!(v["read_count"], 2);
        assert_eq!(v["partition"], "2024-06-01");
        assert_eq!(v["attributes"]["group"], "alt.test");
    }
}
