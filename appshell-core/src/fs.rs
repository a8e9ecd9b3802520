use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

use crate::error::ErrorCode;

const UTF8_BOM: &str = "\u{feff}";

/// File system types reported as network mounts by `is_network_drive`.
const NETWORK_FS_TYPES: &[&str] = &[
    "nfs", "nfs4", "cifs", "smbfs", "smb3", "afs", "ncpfs", "9p", "fuse.sshfs", "davfs",
];

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct FileInfo {
    /// Seconds since the Unix epoch, with sub-second precision.
    pub modified: f64,
    pub is_dir: bool,
    pub size: u64,
    pub real_path: String,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FileContents {
    pub contents: String,
    pub encoding: String,
    pub preserve_bom: bool,
}

/// Canonical name for an encoding the shell can read and write.
fn normalize_encoding(encoding: &str) -> Result<&'static str, ErrorCode> {
    match encoding.to_ascii_lowercase().as_str() {
        "" | "utf8" | "utf-8" => Ok("utf8"),
        _ => Err(ErrorCode::UnsupportedEncoding),
    }
}

/// List the names in a directory (no `.`/`..`, no paths).
pub fn read_dir(path: &str) -> Result<Vec<String>, ErrorCode> {
    let dir = Path::new(path);
    let metadata = fs::metadata(dir).map_err(|e| ErrorCode::from_read_error(&e))?;
    if !metadata.is_dir() {
        return Err(ErrorCode::NotDirectory);
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| ErrorCode::from_read_error(&e))? {
        let entry = entry.map_err(|e| ErrorCode::from_read_error(&e))?;
        names.push(entry.file_name().to_string_lossy().to_string());
    }
    Ok(names)
}

/// Create a directory and any missing parents with the given mode.
pub fn make_dir(path: &str, mode: u32) -> Result<(), ErrorCode> {
    let dir = Path::new(path);
    if dir.exists() {
        return Err(ErrorCode::FileExists);
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    builder
        .create(dir)
        .map_err(|e| ErrorCode::from_write_error(&e))
}

pub fn rename(old_path: &str, new_path: &str) -> Result<(), ErrorCode> {
    if !Path::new(old_path).exists() {
        return Err(ErrorCode::NotFound);
    }
    if Path::new(new_path).exists() {
        return Err(ErrorCode::FileExists);
    }
    fs::rename(old_path, new_path).map_err(|e| ErrorCode::from_write_error(&e))
}

pub fn file_info(path: &str) -> Result<FileInfo, ErrorCode> {
    let metadata = fs::metadata(path).map_err(|e| ErrorCode::from_read_error(&e))?;
    let modified = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    let real_path = fs::canonicalize(path)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| path.to_string());

    Ok(FileInfo {
        modified,
        is_dir: metadata.is_dir(),
        size: metadata.len(),
        real_path,
    })
}

pub fn read_file(path: &str, encoding: &str) -> Result<FileContents, ErrorCode> {
    let encoding = normalize_encoding(encoding)?;
    let metadata = fs::metadata(path).map_err(|e| ErrorCode::from_read_error(&e))?;
    if metadata.is_dir() {
        return Err(ErrorCode::CantRead);
    }

    let bytes = fs::read(path).map_err(|e| ErrorCode::from_read_error(&e))?;
    let text = String::from_utf8(bytes).map_err(|_| ErrorCode::UnsupportedEncoding)?;
    let (contents, preserve_bom) = match text.strip_prefix(UTF8_BOM) {
        Some(rest) => (rest.to_string(), true),
        None => (text, false),
    };

    Ok(FileContents {
        contents,
        encoding: encoding.to_string(),
        preserve_bom,
    })
}

pub fn write_file(
    path: &str,
    contents: &str,
    encoding: &str,
    preserve_bom: bool,
) -> Result<(), ErrorCode> {
    normalize_encoding(encoding)?;
    let target = Path::new(path);
    if target.is_dir() {
        return Err(ErrorCode::CantWrite);
    }

    let mut file = fs::File::create(target).map_err(|e| ErrorCode::from_write_error(&e))?;
    if preserve_bom {
        file.write_all(UTF8_BOM.as_bytes())
            .map_err(|e| ErrorCode::from_write_error(&e))?;
    }
    file.write_all(contents.as_bytes())
        .map_err(|e| ErrorCode::from_write_error(&e))?;
    file.flush().map_err(|e| ErrorCode::from_write_error(&e))
}

pub fn set_posix_permissions(path: &str, mode: u32) -> Result<(), ErrorCode> {
    if !Path::new(path).exists() {
        return Err(ErrorCode::NotFound);
    }
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| ErrorCode::from_write_error(&e))
    }
    #[cfg(not(unix))]
    {
        let _ = mode;
        Ok(())
    }
}

/// Delete a file, or a directory with everything under it.
pub fn delete_file_or_directory(path: &str) -> Result<(), ErrorCode> {
    let target = Path::new(path);
    let metadata = fs::symlink_metadata(target).map_err(|e| ErrorCode::from_write_error(&e))?;
    let result = if metadata.is_dir() {
        fs::remove_dir_all(target)
    } else {
        fs::remove_file(target)
    };
    result.map_err(|e| ErrorCode::from_write_error(&e))
}

pub fn copy_file(source: &str, destination: &str) -> Result<(), ErrorCode> {
    let metadata = fs::metadata(source).map_err(|e| ErrorCode::from_read_error(&e))?;
    if metadata.is_dir() {
        return Err(ErrorCode::NotFile);
    }
    fs::copy(source, destination)
        .map(|_| ())
        .map_err(|e| ErrorCode::from_write_error(&e))
}

/// Whether `path` lives on a network file system, judged from the mount table.
pub fn is_network_drive(path: &str) -> Result<bool, ErrorCode> {
    let canonical = fs::canonicalize(path).map_err(|e| ErrorCode::from_read_error(&e))?;
    let mounts = match fs::read_to_string("/proc/self/mounts") {
        Ok(mounts) => mounts,
        Err(e) => {
            log::debug!("Mount table unavailable: {}", e);
            return Ok(false);
        }
    };
    Ok(mount_fs_type(&mounts, &canonical)
        .map(|fs_type| NETWORK_FS_TYPES.contains(&fs_type))
        .unwrap_or(false))
}

/// File system type of the longest mount point containing `path`.
fn mount_fs_type<'a>(mounts: &'a str, path: &Path) -> Option<&'a str> {
    let mut best: Option<(usize, &str)> = None;
    for line in mounts.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        let mount_point = PathBuf::from(fields[1].replace("\\040", " "));
        if !path.starts_with(&mount_point) {
            continue;
        }
        let depth = mount_point.components().count();
        if best.map(|(d, _)| depth >= d).unwrap_or(true) {
            best = Some((depth, fields[2]));
        }
    }
    best.map(|(_, fs_type)| fs_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_str(path: &Path) -> String {
        path.to_string_lossy().to_string()
    }

    #[test]
    fn read_dir_lists_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();

        let mut names = read_dir(&path_str(dir.path())).unwrap();
        names.sort();
        assert_eq!(names, vec!["a.txt", "sub"]);
    }

    #[test]
    fn read_dir_on_file_is_not_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "a").unwrap();
        assert_eq!(read_dir(&path_str(&file)), Err(ErrorCode::NotDirectory));
        assert_eq!(
            read_dir(&path_str(&dir.path().join("missing"))),
            Err(ErrorCode::NotFound)
        );
    }

    #[test]
    fn make_dir_is_recursive_and_rejects_existing() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        make_dir(&path_str(&nested), 0o755).unwrap();
        assert!(nested.is_dir());
        assert_eq!(make_dir(&path_str(&nested), 0o755), Err(ErrorCode::FileExists));
    }

    #[test]
    fn rename_refuses_to_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();
        assert_eq!(
            rename(&path_str(&a), &path_str(&b)),
            Err(ErrorCode::FileExists)
        );

        let c = dir.path().join("c");
        rename(&path_str(&a), &path_str(&c)).unwrap();
        assert!(!a.exists());
        assert_eq!(fs::read_to_string(&c).unwrap(), "a");
    }

    #[test]
    fn file_info_reports_kind_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "hello").unwrap();

        let info = file_info(&path_str(&file)).unwrap();
        assert!(!info.is_dir);
        assert_eq!(info.size, 5);
        assert!(info.modified > 0.0);
        assert!(info.real_path.ends_with("f.txt"));
        assert!(file_info(&path_str(dir.path())).unwrap().is_dir);
    }

    #[test]
    fn bom_is_stripped_and_restored() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bom.js");
        fs::write(&file, "\u{feff}var x;").unwrap();

        let read = read_file(&path_str(&file), "utf8").unwrap();
        assert_eq!(read.contents, "var x;");
        assert!(read.preserve_bom);

        write_file(&path_str(&file), "var y;", "UTF-8", true).unwrap();
        assert_eq!(&fs::read(&file).unwrap()[..3], &[0xEFu8, 0xBB, 0xBF]);

        write_file(&path_str(&file), "var z;", "utf8", false).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "var z;");
    }

    #[test]
    fn read_file_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("bin");
        fs::write(&binary, [0xff, 0xfe, 0x00, 0xd8]).unwrap();

        assert_eq!(
            read_file(&path_str(&binary), "utf8"),
            Err(ErrorCode::UnsupportedEncoding)
        );
        assert_eq!(
            read_file(&path_str(&binary), "latin1"),
            Err(ErrorCode::UnsupportedEncoding)
        );
        assert_eq!(
            read_file(&path_str(dir.path()), "utf8"),
            Err(ErrorCode::CantRead)
        );
        assert_eq!(
            write_file(&path_str(dir.path()), "x", "utf8", false),
            Err(ErrorCode::CantWrite)
        );
    }

    #[test]
    fn delete_and_copy() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("inner.txt"), "x").unwrap();

        let copy = dir.path().join("copy.txt");
        copy_file(&path_str(&sub.join("inner.txt")), &path_str(&copy)).unwrap();
        assert_eq!(fs::read_to_string(&copy).unwrap(), "x");
        assert_eq!(
            copy_file(&path_str(&sub), &path_str(&copy)),
            Err(ErrorCode::NotFile)
        );

        delete_file_or_directory(&path_str(&sub)).unwrap();
        assert!(!sub.exists());
        assert_eq!(
            delete_file_or_directory(&path_str(&sub)),
            Err(ErrorCode::NotFound)
        );
    }

    #[cfg(unix)]
    #[test]
    fn permissions_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("script.sh");
        fs::write(&file, "#!/bin/sh").unwrap();
        set_posix_permissions(&path_str(&file), 0o700).unwrap();
        let mode = fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn longest_mount_point_wins() {
        let mounts = "\
/dev/sda1 / ext4 rw 0 0
server:/export /home/user/net nfs4 rw 0 0
/dev/sdb1 /home ext4 rw 0 0
";
        assert_eq!(
            mount_fs_type(mounts, Path::new("/home/user/net/project")),
            Some("nfs4")
        );
        assert_eq!(
            mount_fs_type(mounts, Path::new("/home/user/local")),
            Some("ext4")
        );
        assert_eq!(mount_fs_type(mounts, Path::new("/tmp")), Some("ext4"));
    }
}
