use valet_core::error::{Result, ValetError};

const BRAVE_API: &str = "https://api.search.brave.com/res/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Web,
    News,
    Images,
    Videos,
    Local,
}

impl SearchKind {
    pub fn from_str(s: &str) -> Self {
        match s {
            "news" => Self::News,
            "image" | "images" => Self::Images,
            "video" | "videos" => Self::Videos,
            "local" => Self::Local,
            _ => Self::Web,
        }
    }

    fn endpoint(&self) -> &'static str {
        match self {
            // Local results ride on the web endpoint as a result filter.
            Self::Web | Self::Local => "web/search",
            Self::News => "news/search",
            Self::Images => "images/search",
            Self::Videos => "videos/search",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub description: String,
}

pub struct BraveSearch {
    api_key: String,
    http: reqwest::Client,
}

impl BraveSearch {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http: reqwest::Client::new(),
        }
    }

    pub async fn search(
        &self,
        kind: SearchKind,
        query: &str,
        count: u32,
    ) -> Result<Vec<SearchResult>> {
        let mut url = format!(
            "{BRAVE_API}/{}?q={}&count={count}",
            kind.endpoint(),
            urlencod(query),
        );
        if kind == SearchKind::Local {
            url.push_str("&result_filter=locations");
        }

        let resp = self
            .http
            .get(&url)
            .header("accept", "application/json")
            .header("x-subscription-token", &self.api_key)
            .send()
            .await
            .map_err(|e| ValetError::Integration(format!("brave search failed: {e}")))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| ValetError::Integration(format!("brave response read failed: {e}")))?;

        if status != 200 {
            return Err(ValetError::Http { status, body: text });
        }

        let json: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ValetError::Integration(format!("brave json parse failed: {e}")))?;

        Ok(extract_results(kind, &json))
    }
}

fn extract_results(kind: SearchKind, body: &serde_json::Value) -> Vec<SearchResult> {
    let items = match kind {
        SearchKind::Web => body["web"]["results"].as_array(),
        SearchKind::Local => body["locations"]["results"]
            .as_array()
            .or_else(|| body["web"]["results"].as_array()),
        SearchKind::News | SearchKind::Images | SearchKind::Videos => body["results"].as_array(),
    };

    items
        .map(|arr| arr.iter().map(parse_result).collect())
        .unwrap_or_default()
}

fn parse_result(v: &serde_json::Value) -> SearchResult {
    SearchResult {
        title: v["title"].as_str().unwrap_or_default().to_string(),
        url: v["url"].as_str().unwrap_or_default().to_string(),
        description: v["description"]
            .as_str()
            .or_else(|| v["snippet"].as_str())
            .unwrap_or_default()
            .to_string(),
    }
}

fn urlencod(s: &str) -> String {
    s.replace('%', "%25")
        .replace(' ', "%20")
        .replace('&', "%26")
        .replace('=', "%3D")
        .replace('+', "%2B")
        .replace('?', "%3F")
        .replace('#', "%23")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        assert_eq!(SearchKind::from_str("news"), SearchKind::News);
        assert_eq!(SearchKind::from_str("image"), SearchKind::Images);
        assert_eq!(SearchKind::from_str("anything"), SearchKind::Web);
    }

    #[test]
    fn test_extract_web_results() {
        let body = serde_json::json!({
            "web": {
                "results": [
                    { "title": "Rust", "url": "https://rust-lang.org", "description": "A language" },
                ]
            }
        });
        let results = extract_results(SearchKind::Web, &body);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Rust");
    }

    #[test]
    fn test_extract_news_results() {
        let body = serde_json::json!({
            "results": [
                { "title": "Headline", "url": "https://example.com", "description": "Story" },
            ]
        });
        let results = extract_results(SearchKind::News, &body);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_extract_missing_results() {
        let body = serde_json::json!({});
        assert!(extract_results(SearchKind::Web, &body).is_empty());
    }
}
