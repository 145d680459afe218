//! Site-wide endpoints: sitemap and health check

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::middleware::AppState;
use crate::models::Post;

/// Public pages listed in the sitemap next to blog posts
const STATIC_PAGES: [&str; 6] = [
    "/",
    "/barbershop/about-us/",
    "/barbershop/services/popular/",
    "/barbershop/order_create/",
    "/barbershop/review/create/",
    "/blog/",
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sitemap.xml", get(sitemap))
        .route("/health", get(health))
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

struct SitemapEntry {
    loc: String,
    lastmod: Option<DateTime<Utc>>,
    changefreq: &'static str,
    priority: &'static str,
}

/// Sitemap document for published posts followed by the static pages
pub fn render_sitemap(base_url: &str, posts: &[Post]) -> String {
    let base = base_url.trim_end_matches('/');
    let entries = posts
        .iter()
        .map(|post| SitemapEntry {
            loc: format!("{}/blog/{}/", base, post.slug),
            lastmod: Some(post.updated_at),
            changefreq: "weekly",
            priority: "0.9",
        })
        .chain(STATIC_PAGES.iter().map(|path| SitemapEntry {
            loc: format!("{}{}", base, path),
            lastmod: None,
            changefreq: "monthly",
            priority: "0.5",
        }));

    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for entry in entries {
        xml.push_str("  <url>\n");
        xml.push_str(&format!("    <loc>{}</loc>\n", xml_escape(&entry.loc)));
        if let Some(lastmod) = entry.lastmod {
            xml.push_str(&format!("    <lastmod>{}</lastmod>\n", lastmod.format("%Y-%m-%d")));
        }
        xml.push_str(&format!("    <changefreq>{}</changefreq>\n", entry.changefreq));
        xml.push_str(&format!("    <priority>{}</priority>\n", entry.priority));
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

/// GET /sitemap.xml
async fn sitemap(State(state): State<AppState>) -> Response {
    match state.blog_service.sitemap_posts().await {
        Ok(posts) => (
            [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
            render_sitemap(&state.config.server.base_url, &posts),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to build sitemap: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub version: &'static str,
}

/// GET /health - liveness with a database ping
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, database, code) = match state.pool.ping().await {
        Ok(()) => ("ok", "ok", StatusCode::OK),
        Err(e) => {
            tracing::error!("Health check database ping failed: {}", e);
            ("degraded", "unreachable", StatusCode::SERVICE_UNAVAILABLE)
        }
    };
    (
        code,
        Json(HealthResponse {
            status,
            database,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post(slug: &str) -> Post {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap();
        Post {
            id: 1,
            title: "Уход за бородой".to_string(),
            slug: slug.to_string(),
            cover: None,
            md_content: String::new(),
            html_content: String::new(),
            category_id: None,
            author_id: None,
            is_published: true,
            views_count: 0,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_sitemap_lists_posts_then_static_pages() {
        let xml = render_sitemap("https://arbuz.example/", &[post("beard-care")]);
        assert!(xml.contains("<loc>https://arbuz.example/blog/beard-care/</loc>"));
        assert!(xml.contains("<lastmod>2024-03-05</lastmod>"));
        assert!(xml.contains("<priority>0.9</priority>"));
        assert!(xml.contains("<loc>https://arbuz.example/barbershop/about-us/</loc>"));
        assert_eq!(xml.matches("<changefreq>monthly</changefreq>").count(), STATIC_PAGES.len());
        assert!(xml.find("beard-care").unwrap() < xml.find("about-us").unwrap());
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a&b<c>"), "a&amp;b&lt;c&gt;");
    }
}
