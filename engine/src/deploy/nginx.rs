//! nginx server block rendering

use crate::utils::sha256_hash;

/// Response headers added to every response
pub const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("X-Frame-Options", "SAMEORIGIN"),
    ("X-Content-Type-Options", "nosniff"),
    ("X-XSS-Protection", "1; mode=block"),
];

/// MIME types compressed with gzip (text/html is always compressed by nginx)
pub const GZIP_TYPES: &[&str] = &[
    "text/plain",
    "text/css",
    "application/json",
    "application/javascript",
    "text/xml",
    "application/xml",
    "application/xml+rss",
    "text/javascript",
];

/// Extensions served with long-lived immutable caching
pub const CACHED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "ico", "css", "js", "svg", "woff", "woff2", "ttf", "eot",
];

/// Document that unmatched paths fall back to
pub const INDEX_DOCUMENT: &str = "index.html";

/// Routing configuration for one domain.
///
/// Rendering is a pure function of the domain and the artifact directory, so
/// re-applying the same deployment always produces identical bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    pub domain: String,
    pub root: String,
}

impl RoutingConfig {
    pub fn new(domain: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            root: root.into(),
        }
    }

    /// Render the server block
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("server {\n");
        out.push_str("    listen 80;\n");
        out.push_str(&format!("    server_name {};\n\n", self.domain));
        out.push_str(&format!("    root {};\n", self.root));
        out.push_str(&format!("    index {} index.htm;\n\n", INDEX_DOCUMENT));

        out.push_str("    # Security headers\n");
        for (name, value) in SECURITY_HEADERS {
            out.push_str(&format!("    add_header {} \"{}\" always;\n", name, value));
        }

        out.push_str("\n    # Gzip compression\n");
        out.push_str("    gzip on;\n");
        out.push_str(&format!("    gzip_types {};\n\n", GZIP_TYPES.join(" ")));

        out.push_str("    location / {\n");
        out.push_str(&format!("        try_files $uri $uri/ /{};\n", INDEX_DOCUMENT));
        out.push_str("    }\n\n");

        out.push_str("    # Cache static assets\n");
        out.push_str(&format!(
            "    location ~* \\.({})$ {{\n",
            CACHED_EXTENSIONS.join("|")
        ));
        out.push_str("        expires 1y;\n");
        out.push_str("        add_header Cache-Control \"public, immutable\";\n");
        out.push_str("    }\n");
        out.push_str("}\n");
        out
    }

    /// SHA-256 of the rendered configuration
    pub fn digest(&self) -> String {
        sha256_hash(self.render().as_bytes())
    }
}
