use serde::{Deserialize, Serialize};

/// Content represents a message with multiple parts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub const ROLE_USER: &'static str = "user";
    pub const ROLE_MODEL: &'static str = "model";
    pub const ROLE_FUNCTION: &'static str = "function";

    pub fn new_user_text(text: impl Into<String>) -> Self {
        Self {
            role: Self::ROLE_USER.to_string(),
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    pub fn new_model_text(text: impl Into<String>) -> Self {
        Self {
            role: Self::ROLE_MODEL.to_string(),
            parts: vec![Part::Text { text: text.into() }],
        }
    }

    /// Concatenated text of all text parts, `None` when there are none
    pub fn text(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }

    pub fn function_calls(&self) -> Vec<FunctionCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::FunctionCall { function_call } => Some(function_call.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Part represents a single part of content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: FunctionResponse,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub args: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionResponse {
    pub name: String,
    pub response: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_joins_text_parts_only() {
        let content = Content {
            role: Content::ROLE_MODEL.to_string(),
            parts: vec![
                Part::Text {
                    text: "Top ".to_string(),
                },
                Part::FunctionCall {
                    function_call: FunctionCall {
                        name: "sql_db_list_tables".to_string(),
                        args: serde_json::json!({}),
                        id: Some("call-1".to_string()),
                    },
                },
                Part::Text {
                    text: "artists".to_string(),
                },
            ],
        };

        assert_eq!(content.text().as_deref(), Some("Top artists"));
        assert_eq!(content.function_calls().len(), 1);
    }

    #[test]
    fn test_part_wire_format() {
        let part = Part::FunctionCall {
            function_call: FunctionCall {
                name: "sql_db_query".to_string(),
                args: serde_json::json!({"query": "SELECT 1"}),
                id: None,
            },
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["functionCall"]["name"], "sql_db_query");
        assert!(json["functionCall"].get("id").is_none());
    }
}
