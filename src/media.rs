//! Stock media search backing the palette's image and video commands.
//!
//! Images come from the Openverse API, videos from the Internet Archive;
//! both are keyless JSON endpoints. Results carry enough to render a picker
//! row and to build the HTML embed inserted on selection.

use crate::constants::{MEDIA_SEARCH_PAGE_SIZE, OPENVERSE_BASE_URL};
use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct MediaResult {
    pub title: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub creator: Option<String>,
}

impl MediaResult {
    /// HTML fragment embedding this result in the document.
    pub fn embed_image(&self) -> String {
        format!(
            "<img src=\"{}\" alt=\"{}\">",
            self.url,
            html_escape::encode_double_quoted_attribute(&self.title)
        )
    }

    pub fn embed_video(&self) -> String {
        format!(
            "<iframe src=\"{}\" title=\"{}\" allowfullscreen></iframe>",
            self.url,
            html_escape::encode_double_quoted_attribute(&self.title)
        )
    }
}

#[derive(Deserialize)]
struct OpenverseResponse {
    results: Vec<OpenverseResult>,
}

#[derive(Deserialize)]
struct OpenverseResult {
    title: Option<String>,
    url: Option<String>,
    thumbnail: Option<String>,
    creator: Option<String>,
}

pub async fn search_images(query: &str) -> Result<Vec<MediaResult>> {
    let url = format!(
        "{}/images/?q={}&page_size={}",
        OPENVERSE_BASE_URL,
        urlencoding::encode(query),
        MEDIA_SEARCH_PAGE_SIZE
    );
    let client = reqwest::Client::new();
    let response: OpenverseResponse = client
        .get(url)
        .header("User-Agent", "copydesk")
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(response
        .results
        .into_iter()
        .filter_map(|r| {
            let url = r.url?;
            Some(MediaResult {
                title: r.title.unwrap_or_else(|| "Untitled".to_string()),
                url,
                thumbnail: r.thumbnail,
                creator: r.creator,
            })
        })
        .collect())
}

#[derive(Deserialize)]
struct ArchiveSearchResponse {
    response: ArchiveDocs,
}

#[derive(Deserialize)]
struct ArchiveDocs {
    docs: Vec<ArchiveDoc>,
}

#[derive(Deserialize)]
struct ArchiveDoc {
    identifier: String,
    title: Option<String>,
    creator: Option<serde_json::Value>,
}

pub async fn search_videos(query: &str) -> Result<Vec<MediaResult>> {
    let url = format!(
        "https://archive.org/advancedsearch.php?q={}+AND+mediatype:movies&fl[]=identifier&fl[]=title&fl[]=creator&rows={}&output=json",
        urlencoding::encode(query),
        MEDIA_SEARCH_PAGE_SIZE
    );
    let client = reqwest::Client::new();
    let response: ArchiveSearchResponse = client
        .get(url)
        .header("User-Agent", "copydesk")
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(response
        .response
        .docs
        .into_iter()
        .map(|doc| MediaResult {
            title: doc.title.unwrap_or_else(|| doc.identifier.clone()),
            url: format!("https://archive.org/embed/{}", doc.identifier),
            thumbnail: Some(format!(
                "https://archive.org/services/img/{}",
                doc.identifier
            )),
            creator: doc.creator.map(flatten_creator),
        })
        .collect())
}

// The archive API returns creator as either a string or a list of strings.
fn flatten_creator(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embed_image_escapes_title() {
        let result = MediaResult {
            title: "A \"sunny\" day".to_string(),
            url: "https://example.org/sun.jpg".to_string(),
            thumbnail: None,
            creator: None,
        };
        let html = result.embed_image();
        assert!(html.contains("src=\"https://example.org/sun.jpg\""));
        assert!(html.contains("&quot;sunny&quot;"));
    }

    #[test]
    fn test_openverse_response_parses() {
        let body = r#"{"results":[
            {"title":"Fox","url":"https://img.example/fox.jpg","thumbnail":"https://img.example/t.jpg","creator":"Ada"},
            {"title":"No url entry"}
        ]}"#;
        let parsed: OpenverseResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert!(parsed.results[1].url.is_none());
    }

    #[test]
    fn test_archive_creator_flattening() {
        assert_eq!(
            flatten_creator(serde_json::json!("One Person")),
            "One Person"
        );
        assert_eq!(
            flatten_creator(serde_json::json!(["A", "B"])),
            "A, B"
        );
    }
}
