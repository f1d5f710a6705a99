use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, de};
use validator::{Validate, ValidationError};

/// browsers send untouched form fields as `name=`, those count as not given
fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    match Option::<String>::deserialize(deserializer)?.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(de::Error::custom),
    }
}

/// query string accepted by `/search`, forwarded to the provider's `/subtitles`
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_search_target"))]
pub struct SearchParams {
    pub query: Option<String>,
    pub languages: Option<String>,
    pub tmdb_id: Option<String>,
    pub imdb_id: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(range(min = 0))]
    pub season_number: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(range(min = 0))]
    pub episode_number: Option<i64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(range(min = 1))]
    pub page: Option<i64>,
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// a search has to name *something*, otherwise there's no point asking upstream
fn validate_search_target(params: &SearchParams) -> Result<(), ValidationError> {
    if present(&params.query) || present(&params.tmdb_id) || present(&params.imdb_id) {
        Ok(())
    } else {
        Err(ValidationError::new("missing_search_target")
            .with_message("query, tmdb_id or imdb_id is required".into()))
    }
}

impl SearchParams {
    /// the query pairs sent upstream, blanks are dropped and values trimmed
    pub fn to_upstream_query(&self) -> Vec<(String, String)> {
        let text = [
            ("query", &self.query),
            ("languages", &self.languages),
            ("tmdb_id", &self.tmdb_id),
            ("imdb_id", &self.imdb_id),
        ];
        let numbers = [
            ("season_number", self.season_number),
            ("episode_number", self.episode_number),
            ("page", self.page),
        ];

        let mut pairs: Vec<(String, String)> = text
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| (key.to_string(), v.to_string()))
            })
            .collect();

        pairs.extend(
            numbers
                .into_iter()
                .filter_map(|(key, value)| value.map(|v| (key.to_string(), v.to_string()))),
        );

        pairs
    }
}

/// `/download` and `/download-file` input, from the query string or a json body
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DownloadParams {
    #[validate(range(min = 1, message = "file_id must be a positive number"))]
    pub file_id: i64,
    #[serde(default, deserialize_with = "empty_as_none")]
    #[validate(length(min = 1, max = 10, message = "sub_format must be 1-10 characters"))]
    pub sub_format: Option<String>,
}

impl DownloadParams {
    pub fn upstream_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({ "file_id": self.file_id });
        if let Some(format) = self.sub_format.as_deref() {
            body["sub_format"] = serde_json::Value::String(format.to_string());
        }
        body
    }
}

/// the two fields of the provider's download answer the proxy cares about
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadLink {
    pub link: Option<String>,
    pub file_name: Option<String>,
}
