use serde_json::Value;

/// A response body read as text, then parsed as JSON when possible.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(Value),
    /// Body that was not valid JSON, passed through unchanged.
    Text(String),
}

impl ResponseBody {
    pub fn parse(text: String) -> Self {
        if text.is_empty() {
            return ResponseBody::Empty;
        }
        match serde_json::from_str(&text) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Text(text),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The string `detail` field of a JSON object body.
    pub fn detail(&self) -> Option<&str> {
        self.as_json()?.get("detail")?.as_str()
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_variants() {
        assert_eq!(ResponseBody::parse(String::new()), ResponseBody::Empty);
        assert_eq!(
            ResponseBody::parse(r#"{"ok": true}"#.to_string()),
            ResponseBody::Json(json!({"ok": true}))
        );
        assert_eq!(
            ResponseBody::parse("{not json".to_string()),
            ResponseBody::Text("{not json".to_string())
        );
    }

    #[test]
    fn test_detail_only_from_string_field() {
        let body = ResponseBody::Json(json!({"detail": "Password updated."}));
        assert_eq!(body.detail(), Some("Password updated."));

        let body = ResponseBody::Json(json!({"detail": ["not a string"]}));
        assert_eq!(body.detail(), None);

        assert_eq!(ResponseBody::Text("detail".to_string()).detail(), None);
    }
}
