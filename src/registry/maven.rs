use anyhow::Result;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Client;

use super::{Resolution, USER_AGENT};
use crate::purl::Purl;

/// Resolve a Maven artifact against Maven Central.
///
/// The license comes from the POM; the download location is the main jar.
pub async fn resolve(client: &Client, purl: &Purl) -> Result<Option<Resolution>> {
    let (Some(group_id), Some(version)) = (purl.namespace.as_deref(), purl.version.as_deref()) else {
        return Ok(None);
    };
    let artifact_id = &purl.name;

    let base = format!(
        "https://repo1.maven.org/maven2/{}/{}/{}",
        group_id.replace('.', "/"),
        artifact_id,
        version
    );
    let pom_url = format!("{}/{}-{}.pom", base, artifact_id, version);

    let response = client
        .get(&pom_url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await?;

    if !response.status().is_success() {
        return Ok(None);
    }

    let pom = parse_pom(&response.text().await?);
    Ok(Some(Resolution {
        download_url: Some(format!("{}/{}-{}.jar", base, artifact_id, version)),
        licenses: pom.licenses,
        homepage_url: pom.url,
        repository_url: pom.scm_url,
        description: pom.description,
    }))
}

/// Fields of interest in a POM document.
#[derive(Debug, Default, PartialEq)]
pub struct PomInfo {
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub scm_url: Option<String>,
    /// Every `<licenses><license><name>` in document order.
    pub licenses: Vec<String>,
}

/// Parse the project-level fields and license names out of a POM.
///
/// Only direct children of `<project>` are taken for identity fields so that
/// `<parent><version>` and dependency versions are not picked up.
pub fn parse_pom(xml: &str) -> PomInfo {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut info = PomInfo::default();
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                path.push(String::from_utf8_lossy(e.name().local_name().as_ref()).into_owned());
            }
            Ok(Event::Text(ref e)) => {
                let Ok(text) = e.unescape() else {
                    buf.clear();
                    continue;
                };
                let text = text.trim().to_string();
                if text.is_empty() {
                    buf.clear();
                    continue;
                }
                let segments: Vec<&str> = path.iter().map(String::as_str).collect();
                match segments.as_slice() {
                    ["project", "artifactId"] => info.artifact_id = Some(text),
                    ["project", "version"] => info.version = Some(text),
                    ["project", "description"] => info.description = Some(text),
                    ["project", "url"] => info.url = Some(text),
                    ["project", "scm", "url"] => info.scm_url = Some(text),
                    ["project", "licenses", "license", "name"] => info.licenses.push(text),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pom() {
        let pom = r#"<?xml version="1.0"?>
<project>
  <parent>
    <artifactId>commons-parent</artifactId>
    <version>54</version>
  </parent>
  <artifactId>commons-lang3</artifactId>
  <version>3.12.0</version>
  <description>Apache Commons Lang</description>
  <url>https://commons.apache.org/proper/commons-lang/</url>
  <licenses>
    <license>
      <name>Apache License, Version 2.0</name>
      <url>https://www.apache.org/licenses/LICENSE-2.0</url>
    </license>
  </licenses>
</project>"#;
        let info = parse_pom(pom);
        assert_eq!(info.artifact_id.as_deref(), Some("commons-lang3"));
        assert_eq!(info.version.as_deref(), Some("3.12.0"));
        assert_eq!(info.licenses, vec!["Apache License, Version 2.0".to_string()]);
        assert_eq!(info.description.as_deref(), Some("Apache Commons Lang"));
    }

    #[test]
    fn test_parse_pom_without_licenses() {
        let info = parse_pom("<project><artifactId>x</artifactId></project>");
        assert!(info.licenses.is_empty());
        assert_eq!(info.artifact_id.as_deref(), Some("x"));
    }
}
