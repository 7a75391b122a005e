//! Common API models
//!
//! The remote store wraps every payload in `{code, msg, content}` and every
//! list in `{data, total}`. Console code works with [`Page`].

use serde::{Deserialize, Serialize};

use cloudrec_common::{SUCCESS_CODE, SUCCESS_MSG};

/// Response envelope returned by the remote store
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiResult<T> {
    pub code: i32,
    pub msg: Option<String>,
    pub content: Option<T>,
}

impl<T> ApiResult<T> {
    pub fn success(content: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: Some(SUCCESS_MSG.to_string()),
            content: Some(content),
        }
    }

    pub fn failure(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: Some(msg.into()),
            content: None,
        }
    }

    /// Any code other than the success sentinel is a failure
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }

    pub fn message(&self) -> &str {
        self.msg.as_deref().unwrap_or_default()
    }
}

/// List payload as emitted by the remote store
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ListContent<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub total: u64,
}

impl<T> Default for ListContent<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            total: 0,
        }
    }
}

impl<T> ListContent<T> {
    /// A missing `total` falls back to the number of rows received
    pub fn into_page(self, page_number: u64, page_size: u64) -> Page<T> {
        let total = if self.total == 0 {
            self.data.len() as u64
        } else {
            self.total
        };
        Page::new(total, page_number, page_size, self.data)
    }
}

/// Generic pagination wrapper
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub total_count: u64,
    pub page_number: u64,
    pub pages_available: u64,
    pub page_items: Vec<T>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            total_count: 0,
            page_number: 1,
            pages_available: 0,
            page_items: vec![],
        }
    }
}

impl<T> Page<T> {
    pub fn new(total_count: u64, page_number: u64, page_size: u64, page_items: Vec<T>) -> Self {
        Self {
            total_count,
            page_number,
            pages_available: if page_size > 0 {
                total_count.div_ceil(page_size)
            } else {
                0
            },
            page_items,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.page_items.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            total_count: self.total_count,
            page_number: self.page_number,
            pages_available: self.pages_available,
            page_items: self.page_items.into_iter().map(f).collect(),
        }
    }
}

/// Slice one page out of an already filtered, ordered collection.
/// Pages are 1-based; page 0 is treated as page 1.
pub fn paginate<T: Clone>(items: &[T], page_number: u64, page_size: u64) -> Page<T> {
    let page_number = page_number.max(1);
    let total = items.len() as u64;
    if page_size == 0 {
        return Page::new(total, page_number, page_size, items.to_vec());
    }
    let start = (page_number - 1).saturating_mul(page_size);
    if start >= total {
        return Page::new(total, page_number, page_size, vec![]);
    }
    let end = start.saturating_add(page_size).min(total);
    Page::new(
        total,
        page_number,
        page_size,
        items[start as usize..end as usize].to_vec(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_result_success_sentinel() {
        let ok: ApiResult<String> =
            serde_json::from_str(r#"{"code":200,"msg":"success","content":"x"}"#).unwrap();
        assert!(ok.is_success());
        assert_eq!(ok.content.as_deref(), Some("x"));

        let failed: ApiResult<String> =
            serde_json::from_str(r#"{"code":500,"msg":"boom"}"#).unwrap();
        assert!(!failed.is_success());
        assert_eq!(failed.message(), "boom");
        assert!(failed.content.is_none());
    }

    #[test]
    fn test_list_content_total_fallback() {
        let content: ListContent<u32> = serde_json::from_str(r#"{"data":[1,2,3]}"#).unwrap();
        let page = content.into_page(1, 10);
        assert_eq!(page.total_count, 3);
        assert_eq!(page.pages_available, 1);

        let content: ListContent<u32> = serde_json::from_str(r#"{}"#).unwrap();
        assert!(content.into_page(1, 10).is_empty());
    }

    #[test]
    fn test_page_new() {
        let page = Page::new(21, 2, 10, vec![1, 2]);
        assert_eq!(page.pages_available, 3);
        let page: Page<u8> = Page::new(5, 1, 0, vec![]);
        assert_eq!(page.pages_available, 0);
    }

    #[test]
    fn test_paginate() {
        let items: Vec<u32> = (1..=25).collect();
        let page = paginate(&items, 3, 10);
        assert_eq!(page.page_items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.total_count, 25);

        let page = paginate(&items, 9, 10);
        assert!(page.is_empty());
        assert_eq!(page.total_count, 25);

        let page = paginate(&items, 0, 5);
        assert_eq!(page.page_number, 1);
        assert_eq!(page.page_items, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_paginate_extreme_bounds() {
        let items: Vec<u32> = (1..=25).collect();

        let page = paginate(&items, u64::MAX, 10);
        assert!(page.is_empty());
        assert_eq!(page.total_count, 25);

        let page = paginate(&items, 2, u64::MAX);
        assert!(page.is_empty());
        assert_eq!(page.pages_available, 1);

        let page = paginate(&items, 1, u64::MAX);
        assert_eq!(page.page_items.len(), 25);
    }

    #[test]
    fn test_api_result_missing_fields() {
        #[derive(Debug, Deserialize)]
        struct NoDefault {
            id: i64,
        }

        let result: ApiResult<NoDefault> = serde_json::from_str(r#"{"code":200}"#).unwrap();
        assert!(result.is_success());
        assert!(result.msg.is_none());
        assert!(result.content.is_none());

        let result: ApiResult<NoDefault> =
            serde_json::from_str(r#"{"code":200,"msg":null,"content":{"id":3}}"#).unwrap();
        assert_eq!(result.content.map(|c| c.id), Some(3));
    }
}
