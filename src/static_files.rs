use std::path::{Component, Path, PathBuf};

pub(crate) enum StaticFile {
    Found {
        contents: Vec<u8>,
        content_type: &'static str,
    },
    Forbidden,
    Missing,
}

/// Looks `relative` up under `root`. `relative` is a still percent-encoded
/// URL path; anything that would step outside `root` is forbidden.
pub(crate) async fn lookup(root: &Path, relative: &str) -> StaticFile {
    let Some(file_path) = resolve(root, relative) else {
        return StaticFile::Forbidden;
    };

    match tokio::fs::metadata(&file_path).await {
        Ok(metadata) if metadata.is_file() => {}
        _ => return StaticFile::Missing,
    }

    match tokio::fs::read(&file_path).await {
        Ok(contents) => {
            let content_type = get_content_type(&file_path);
            tracing::debug!(path = %file_path.display(), content_type, "serving static file");
            StaticFile::Found {
                contents,
                content_type,
            }
        }
        Err(e) => {
            tracing::warn!(path = %file_path.display(), "failed to read static file: {e}");
            StaticFile::Missing
        }
    }
}

fn resolve(root: &Path, relative: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(relative).ok()?;
    let mut path = root.to_path_buf();
    for component in Path::new(decoded.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(path)
}

pub(crate) fn get_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript; charset=utf-8",
        Some("json") | Some("map") => "application/json; charset=utf-8",
        Some("wasm") => "application/wasm",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("txt") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_is_rejected() {
        let root = Path::new("/srv/static");
        assert!(resolve(root, "/../etc/passwd").is_none());
        assert!(resolve(root, "/a/%2E%2E/%2E%2E/etc").is_none());
        assert_eq!(
            resolve(root, "/css/./site%20main.css"),
            Some(PathBuf::from("/srv/static/css/site main.css"))
        );
    }

    #[tokio::test]
    async fn files_are_read_with_their_content_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("js")).unwrap();
        std::fs::write(dir.path().join("js/app.mjs"), "export {}").unwrap();

        match lookup(dir.path(), "/js/app.mjs").await {
            StaticFile::Found {
                contents,
                content_type,
            } => {
                assert_eq!(contents, b"export {}");
                assert_eq!(content_type, "application/javascript; charset=utf-8");
            }
            _ => panic!("expected the file"),
        }
        assert!(matches!(lookup(dir.path(), "/js").await, StaticFile::Missing));
        assert!(matches!(lookup(dir.path(), "/nope.txt").await, StaticFile::Missing));
        assert!(matches!(lookup(dir.path(), "/../x").await, StaticFile::Forbidden));
    }
}
