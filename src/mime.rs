//! Extension-with-dot to content-type registry. Pure function, no
//! allocation beyond the `&'static str` results.

pub fn content_type_for(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        ".html" | ".htm" => "text/html; charset=utf-8",
        ".css" => "text/css; charset=utf-8",
        ".js" | ".mjs" | ".cjs" | ".ts" | ".mts" | ".jsx" | ".tsx" => {
            "application/javascript; charset=utf-8"
        }
        ".json" => "application/json; charset=utf-8",
        ".xml" => "application/xml; charset=utf-8",
        ".txt" => "text/plain; charset=utf-8",
        ".csv" => "text/csv; charset=utf-8",
        ".svg" => "image/svg+xml",
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".ico" => "image/x-icon",
        ".avif" => "image/avif",
        ".woff" => "font/woff",
        ".woff2" => "font/woff2",
        ".ttf" => "font/ttf",
        ".otf" => "font/otf",
        ".eot" => "application/vnd.ms-fontobject",
        ".mp3" => "audio/mpeg",
        ".wav" => "audio/wav",
        ".ogg" => "audio/ogg",
        ".mp4" => "video/mp4",
        ".webm" => "video/webm",
        ".wasm" => "application/wasm",
        ".map" => "application/json; charset=utf-8",
        ".pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Extract the extension (with leading dot, lowercase) from a path, or
/// `""` when there is none.
pub fn extension_of(path: &str) -> String {
    match path.rfind('.') {
        Some(idx) if !path[idx..].contains('/') => path[idx..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_js_family_to_javascript() {
        for ext in [".js", ".mjs", ".cjs", ".ts", ".mts", ".jsx", ".tsx"] {
            assert_eq!(content_type_for(ext), "application/javascript; charset=utf-8");
        }
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        assert_eq!(content_type_for(".zzz"), "application/octet-stream");
    }

    #[test]
    fn extension_of_ignores_dotted_directories() {
        assert_eq!(extension_of("/a.b/c"), "");
        assert_eq!(extension_of("/a.b/c.ts"), ".ts");
        assert_eq!(extension_of("noext"), "");
    }
}
