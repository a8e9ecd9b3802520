use std::path::{Path, PathBuf};

use url::Url;

/// Convert a local path to a `file://` URI.
pub fn file_path_to_uri(path: &Path) -> Option<String> {
    if path.is_dir() {
        Url::from_directory_path(path).ok().map(|u| u.to_string())
    } else {
        Url::from_file_path(path).ok().map(|u| u.to_string())
    }
}

/// Local path for a `file://` URI. Anything else, including plain paths, is
/// returned unchanged.
pub fn uri_to_file_path(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|_| url_decode(url.path())),
        _ => uri.to_string(),
    }
}

/// Decode percent-encoded URL strings, properly handling multi-byte UTF-8.
pub fn url_decode(input: &str) -> String {
    let mut bytes = Vec::with_capacity(input.len());
    let mut chars = input.as_bytes().iter();

    while let Some(&b) = chars.next() {
        if b == b'%' {
            let hex: Vec<u8> = chars.by_ref().take(2).copied().collect();
            if hex.len() == 2 {
                if let Ok(decoded) = u8::from_str_radix(&String::from_utf8_lossy(&hex), 16) {
                    bytes.push(decoded);
                } else {
                    bytes.push(b'%');
                    bytes.extend_from_slice(&hex);
                }
            } else {
                bytes.push(b'%');
                bytes.extend_from_slice(&hex);
            }
        } else {
            bytes.push(b);
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

/// Folder to reveal for a path: the path itself for directories, else its parent.
pub fn containing_folder(path: &Path) -> PathBuf {
    if path.is_dir() {
        return path.to_path_buf();
    }
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"))
}

/// Locate an executable on `PATH`.
pub fn find_command_in_path(command: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(command))
        .find(|candidate| is_executable_file(candidate))
}

fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
