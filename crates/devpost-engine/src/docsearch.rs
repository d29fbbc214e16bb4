//! Fetch migration documentation from several sources in parallel.
//!
//! Five strategies run concurrently per package: user-provided URLs,
//! curated known docs, source-forge release notes, repository
//! changelog files (sliced to the relevant version window), and the
//! package homepage. Joins are best-effort: a failed source
//! contributes nothing and cancels nobody. Results are ranked by
//! relevance, deduplicated by URL, and truncated to the top five.

use devpost_adapters::util::debug_log;
use devpost_core::package::PackageRef;
use futures::future::join_all;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

const FETCH_TIMEOUT_SECS: u64 = 10;
const MAX_GUIDE_BYTES: usize = 100 * 1024;
const MAX_GUIDES: usize = 5;
const MAX_WINDOW_LINES: usize = 150;

const RELEVANCE_USER: i32 = 15;
const RELEVANCE_KNOWN: i32 = 10;
const RELEVANCE_RELEASE: i32 = 9;
const RELEVANCE_CHANGELOG: i32 = 8;
const RELEVANCE_HOMEPAGE: i32 = 6;

const CHANGELOG_FILES: [&str; 5] = [
    "CHANGELOG.md",
    "CHANGELOG.markdown",
    "changelog.md",
    "HISTORY.md",
    "MIGRATION.md",
];
const CHANGELOG_BRANCHES: [&str; 2] = ["main", "master"];

const MIGRATION_KEYWORDS: [&str; 5] = ["migrat", "breaking", "upgrad", "changelog", "deprecat"];

/// A retrieved migration document; transient per-group data.
#[derive(Debug, Clone)]
pub struct MigrationGuide {
    pub source: &'static str,
    pub url: String,
    pub content: String,
    pub relevance: i32,
}

pub struct DocSearch {
    http: reqwest::Client,
    user_docs: HashMap<String, Vec<String>>,
}

impl DocSearch {
    pub fn new(user_docs: HashMap<String, Vec<String>>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("devpost-upgrade/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { http, user_docs }
    }

    /// Run all five strategies for one package and collate the results.
    pub async fn search(&self, pkg: &PackageRef) -> Vec<MigrationGuide> {
        let (user, known, release, changelog, homepage) = tokio::join!(
            self.user_guides(pkg),
            self.known_guides(pkg),
            self.release_notes(pkg),
            self.changelog_guide(pkg),
            self.homepage_guide(pkg),
        );

        let mut guides = Vec::new();
        guides.extend(user);
        guides.extend(known);
        guides.extend(release);
        guides.extend(changelog);
        guides.extend(homepage);

        let collated = collate(guides);
        debug_log(format!(
            "doc search for {}: {} guide(s) [{}]",
            pkg.name,
            collated.len(),
            collated
                .iter()
                .map(|g| g.source)
                .collect::<Vec<_>>()
                .join(", ")
        ));
        collated
    }

    async fn fetch_text(&self, url: &str) -> Option<String> {
        let response = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(err) => {
                debug_log(format!("fetch failed {}: {}", url, err));
                return None;
            }
        };
        if !response.status().is_success() {
            debug_log(format!("fetch {} -> {}", url, response.status()));
            return None;
        }
        let body = response.text().await.ok()?;
        let body = body.trim();
        if body.is_empty() {
            return None;
        }
        Some(cap_bytes(body, MAX_GUIDE_BYTES))
    }

    async fn user_guides(&self, pkg: &PackageRef) -> Vec<MigrationGuide> {
        let Some(urls) = self.user_docs.get(&pkg.name) else {
            return Vec::new();
        };
        let fetches = urls.iter().map(|url| async move {
            self.fetch_text(url).await.map(|content| MigrationGuide {
                source: "user",
                url: url.clone(),
                content,
                relevance: RELEVANCE_USER,
            })
        });
        join_all(fetches).await.into_iter().flatten().collect()
    }

    async fn known_guides(&self, pkg: &PackageRef) -> Vec<MigrationGuide> {
        let urls = known_doc_urls(&pkg.name, &pkg.latest_version);
        let fetches = urls.into_iter().map(|url| async move {
            self.fetch_text(&url).await.map(|raw| {
                let content = if looks_like_html(&raw) {
                    strip_html(&raw)
                } else {
                    raw
                };
                MigrationGuide {
                    source: "known-docs",
                    url,
                    content,
                    relevance: RELEVANCE_KNOWN,
                }
            })
        });
        // First reachable candidate wins; the list is ordered by quality.
        join_all(fetches).await.into_iter().flatten().take(1).collect()
    }

    async fn release_notes(&self, pkg: &PackageRef) -> Vec<MigrationGuide> {
        let Some((owner, repo)) = github_repo(pkg.homepage.as_deref()) else {
            return Vec::new();
        };
        let version = &pkg.latest_version;
        let tags = [
            format!("v{}", version),
            version.clone(),
            format!("{}@{}", pkg.name, version),
        ];

        for tag in &tags {
            let api_url = format!(
                "https://api.github.com/repos/{}/{}/releases/tags/{}",
                owner, repo, tag
            );
            if let Some(body) = self.fetch_release_body(&api_url).await {
                return vec![MigrationGuide {
                    source: "release-notes",
                    url: format!("https://github.com/{}/{}/releases/tag/{}", owner, repo, tag),
                    content: body,
                    relevance: RELEVANCE_RELEASE,
                }];
            }
        }

        // API missed every tag shape: scrape the newest-release page.
        let html_url = format!("https://github.com/{}/{}/releases", owner, repo);
        if let Some(html) = self.fetch_text(&html_url).await {
            let text = strip_html(&html);
            if !text.is_empty() {
                return vec![MigrationGuide {
                    source: "release-notes",
                    url: html_url,
                    content: text,
                    relevance: RELEVANCE_RELEASE,
                }];
            }
        }
        Vec::new()
    }

    async fn fetch_release_body(&self, api_url: &str) -> Option<String> {
        #[derive(serde::Deserialize)]
        struct Release {
            body: Option<String>,
        }
        let text = self.fetch_text(api_url).await?;
        let release: Release = serde_json::from_str(&text).ok()?;
        release.body.filter(|b| !b.trim().is_empty())
    }

    async fn changelog_guide(&self, pkg: &PackageRef) -> Vec<MigrationGuide> {
        let Some((owner, repo)) = github_repo(pkg.homepage.as_deref()) else {
            return Vec::new();
        };
        let Some((from_major, to_major)) = pkg.major_span() else {
            return Vec::new();
        };

        for branch in CHANGELOG_BRANCHES {
            for file in CHANGELOG_FILES {
                let url = format!(
                    "https://raw.githubusercontent.com/{}/{}/{}/{}",
                    owner, repo, branch, file
                );
                let Some(full) = self.fetch_text(&url).await else {
                    continue;
                };
                let window = extract_version_window(&full, from_major, to_major);
                let content = if window.is_empty() {
                    full.lines()
                        .take(MAX_WINDOW_LINES)
                        .collect::<Vec<_>>()
                        .join("\n")
                } else {
                    window
                };
                return vec![MigrationGuide {
                    source: "changelog",
                    url,
                    content,
                    relevance: RELEVANCE_CHANGELOG,
                }];
            }
        }
        Vec::new()
    }

    async fn homepage_guide(&self, pkg: &PackageRef) -> Vec<MigrationGuide> {
        let Some(url) = pkg.homepage.clone() else {
            return Vec::new();
        };
        let Some(html) = self.fetch_text(&url).await else {
            return Vec::new();
        };
        let text = if looks_like_html(&html) {
            strip_html(&html)
        } else {
            html
        };
        let relevant = extract_migration_paragraphs(&text);
        if relevant.is_empty() {
            return Vec::new();
        }
        vec![MigrationGuide {
            source: "homepage",
            url,
            content: relevant,
            relevance: RELEVANCE_HOMEPAGE,
        }]
    }
}

/// Sort by relevance (descending, stable), dedupe by URL, keep the top
/// five.
fn collate(mut guides: Vec<MigrationGuide>) -> Vec<MigrationGuide> {
    guides.sort_by(|a, b| b.relevance.cmp(&a.relevance));
    let mut seen = std::collections::HashSet::new();
    guides.retain(|g| seen.insert(g.url.clone()));
    guides.truncate(MAX_GUIDES);
    guides
}

/// `owner/repo` from a GitHub homepage or repository URL.
fn github_repo(url: Option<&str>) -> Option<(String, String)> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"github\.com[/:]([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)").unwrap()
    });
    let caps = re.captures(url?)?;
    let owner = caps.get(1)?.as_str().to_string();
    let mut repo = caps.get(2)?.as_str();
    repo = repo.strip_suffix(".git").unwrap_or(repo);
    let repo = repo.split('#').next().unwrap_or(repo);
    Some((owner, repo.to_string()))
}

/// Curated candidate URLs for popular packages, derived from the
/// target version. Ordered best-first.
fn known_doc_urls(name: &str, latest: &str) -> Vec<String> {
    let (major, minor, _) = devpost_core::package::parse_version(latest).unwrap_or((0, 0, 0));
    match name {
        "react" | "react-dom" => vec![
            "https://raw.githubusercontent.com/facebook/react/main/CHANGELOG.md".to_string(),
        ],
        "typescript" => vec![format!(
            "https://devblogs.microsoft.com/typescript/announcing-typescript-{}-{}/",
            major, minor
        )],
        "eslint" => vec![format!(
            "https://eslint.org/docs/latest/use/migrate-to-{}.0.0",
            major
        )],
        "jest" => vec![format!("https://jestjs.io/docs/upgrading-to-jest{}", major)],
        "next" => vec![format!(
            "https://nextjs.org/docs/app/building-your-application/upgrading/version-{}",
            major
        )],
        "webpack" => vec![format!("https://webpack.js.org/migrate/{}/", major)],
        "tailwindcss" => vec!["https://tailwindcss.com/docs/upgrade-guide".to_string()],
        _ => Vec::new(),
    }
}

/// Slice a changelog to the window between the current and target
/// major versions: start at the first header with `from < major <= to`,
/// stop at the first header with `major <= from`, cap at 150 lines.
pub fn extract_version_window(changelog: &str, from_major: u64, to_major: u64) -> String {
    let mut captured: Vec<&str> = Vec::new();
    let mut capturing = false;

    for line in changelog.lines() {
        if let Some(major) = header_major(line) {
            if capturing && major <= from_major {
                break;
            }
            if !capturing && major <= to_major && major > from_major {
                capturing = true;
            }
        }
        if capturing {
            captured.push(line);
            if captured.len() >= MAX_WINDOW_LINES {
                break;
            }
        }
    }

    captured.join("\n")
}

/// The major version named by a changelog header line, if any.
fn header_major(line: &str) -> Option<u64> {
    static MARKDOWN: OnceLock<Regex> = OnceLock::new();
    static BARE: OnceLock<Regex> = OnceLock::new();
    let markdown = MARKDOWN
        .get_or_init(|| Regex::new(r"^\s{0,3}#{1,6}\s*\[?v?(\d+)\.\d+").unwrap());
    let bare = BARE.get_or_init(|| {
        Regex::new(r"^\s{0,3}\[?v?(\d+)\.\d+(?:\.\d+)?\]?\s*(?:[-(\u{2013}]|$)").unwrap()
    });

    let caps = markdown.captures(line).or_else(|| bare.captures(line))?;
    caps.get(1)?.as_str().parse().ok()
}

fn looks_like_html(body: &str) -> bool {
    let head: String = body.chars().take(512).collect();
    head.contains("<html") || head.contains("<!DOCTYPE") || head.contains("<div")
}

/// Crude tag stripper; good enough for keyword windows.
fn strip_html(html: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    static SCRIPTS: OnceLock<Regex> = OnceLock::new();
    let scripts = SCRIPTS.get_or_init(|| {
        Regex::new(r"(?is)<(script|style)\b.*?</(script|style)>").unwrap()
    });
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]+>").unwrap());

    let without_scripts = scripts.replace_all(html, " ");
    let without_tags = tags.replace_all(&without_scripts, " ");
    let mut out = String::with_capacity(without_tags.len());
    let mut last_blank = false;
    for line in without_tags.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !last_blank {
                out.push('\n');
            }
            last_blank = true;
        } else {
            out.push_str(line);
            out.push('\n');
            last_blank = false;
        }
    }
    out.trim().to_string()
}

/// Paragraphs mentioning migration keywords, each with its successor
/// for context.
fn extract_migration_paragraphs(text: &str) -> String {
    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut keep: Vec<usize> = Vec::new();
    for (idx, para) in paragraphs.iter().enumerate() {
        let lower = para.to_lowercase();
        if MIGRATION_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            keep.push(idx);
            if idx + 1 < paragraphs.len() {
                keep.push(idx + 1);
            }
        }
    }
    keep.dedup();

    let joined = keep
        .into_iter()
        .map(|idx| paragraphs[idx])
        .collect::<Vec<_>>()
        .join("\n\n");
    cap_bytes(&joined, MAX_GUIDE_BYTES)
}

/// Byte cap on a UTF-8 char boundary.
fn cap_bytes(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_repo_parsing() {
        assert_eq!(
            github_repo(Some("https://github.com/facebook/react")),
            Some(("facebook".into(), "react".into()))
        );
        assert_eq!(
            github_repo(Some("https://github.com/chalk/chalk#readme")),
            Some(("chalk".into(), "chalk".into()))
        );
        assert_eq!(
            github_repo(Some("git@github.com:vercel/next.js.git")),
            Some(("vercel".into(), "next.js".into()))
        );
        assert_eq!(github_repo(Some("https://react.dev")), None);
        assert_eq!(github_repo(None), None);
    }

    #[test]
    fn test_known_doc_urls_derive_from_version() {
        assert_eq!(
            known_doc_urls("typescript", "5.7.2"),
            vec!["https://devblogs.microsoft.com/typescript/announcing-typescript-5-7/"]
        );
        assert_eq!(
            known_doc_urls("eslint", "9.0.0"),
            vec!["https://eslint.org/docs/latest/use/migrate-to-9.0.0"]
        );
        assert!(known_doc_urls("left-pad", "1.3.0").is_empty());
    }

    #[test]
    fn test_extract_version_window_markdown_headers() {
        let changelog = "\
# Changelog

## 6.0.0
six stuff

## 5.3.0
five-three stuff

## 5.0.0
five stuff

## 4.2.0
four stuff
";
        let window = extract_version_window(changelog, 4, 5);
        assert!(window.contains("five-three stuff"));
        assert!(window.contains("five stuff"));
        assert!(!window.contains("six stuff"));
        assert!(!window.contains("four stuff"));
        assert!(window.starts_with("## 5.3.0"));
    }

    #[test]
    fn test_extract_version_window_bare_headers() {
        let changelog = "5.1.0 - 2024-02-01\nnew in five\n\n4.9.0 - 2023-12-01\nold in four\n";
        let window = extract_version_window(changelog, 4, 5);
        assert!(window.contains("new in five"));
        assert!(!window.contains("old in four"));
    }

    #[test]
    fn test_extract_version_window_caps_lines() {
        let mut changelog = String::from("## 5.0.0\n");
        for i in 0..500 {
            changelog.push_str(&format!("line {}\n", i));
        }
        let window = extract_version_window(&changelog, 4, 5);
        assert_eq!(window.lines().count(), MAX_WINDOW_LINES);
    }

    #[test]
    fn test_extract_version_window_empty_when_no_match() {
        let window = extract_version_window("## 3.0.0\nold\n", 4, 5);
        assert!(window.is_empty());
    }

    #[test]
    fn test_header_major_ignores_prose() {
        assert_eq!(header_major("## 5.3.0"), Some(5));
        assert_eq!(header_major("### [v2.1.0] - 2020"), Some(2));
        assert_eq!(header_major("5.1.0 - notes"), Some(5));
        assert_eq!(header_major("We shipped 5.3.0 today"), None);
        assert_eq!(header_major("plain text"), None);
    }

    #[test]
    fn test_collate_ranks_dedupes_truncates() {
        let guide = |source, url: &str, relevance| MigrationGuide {
            source,
            url: url.to_string(),
            content: "c".to_string(),
            relevance,
        };
        let guides = vec![
            guide("changelog", "https://a", RELEVANCE_CHANGELOG),
            guide("user", "https://b", RELEVANCE_USER),
            guide("homepage", "https://a", RELEVANCE_HOMEPAGE),
            guide("known-docs", "https://c", RELEVANCE_KNOWN),
            guide("release-notes", "https://d", RELEVANCE_RELEASE),
            guide("homepage", "https://e", RELEVANCE_HOMEPAGE),
            guide("user", "https://f", RELEVANCE_USER),
        ];
        let collated = collate(guides);
        assert_eq!(collated.len(), MAX_GUIDES);
        assert_eq!(collated[0].relevance, RELEVANCE_USER);
        // Duplicate URL kept only at its highest relevance.
        assert_eq!(
            collated.iter().filter(|g| g.url == "https://a").count(),
            1
        );
        let dropped = collated.iter().any(|g| g.url == "https://e");
        assert!(!dropped);
    }

    #[test]
    fn test_strip_html() {
        let html = "<html><body><script>var x;</script><h1>Title</h1><p>Breaking changes ahead</p></body></html>";
        let text = strip_html(html);
        assert!(text.contains("Title"));
        assert!(text.contains("Breaking changes ahead"));
        assert!(!text.contains("var x"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_extract_migration_paragraphs() {
        let text = "Welcome to the docs.\n\nBreaking changes in v5 are listed below.\n\nThe render API moved.\n\nUnrelated footer.";
        let relevant = extract_migration_paragraphs(text);
        assert!(relevant.contains("Breaking changes"));
        assert!(relevant.contains("render API moved"));
        assert!(!relevant.contains("Unrelated footer"));
        assert!(extract_migration_paragraphs("nothing relevant").is_empty());
    }

    #[test]
    fn test_cap_bytes_respects_char_boundary() {
        let s = "héllo wörld";
        let capped = cap_bytes(s, 3);
        assert!(capped.len() <= 3);
        assert!(s.starts_with(&capped));
        assert_eq!(cap_bytes("short", 100), "short");
    }
}
