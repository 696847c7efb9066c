//! Filesystem helpers shared by the version store and the facade.
//! - Path normalization (`~` expansion, absolute, lexical `..` folding)
//! - Atomic replace-by-rename writes that keep permissions
//! - Directory fsync and streaming blake3 checksums for durable backups
//! - Human-readable sizes and dates used in result records

use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Write},
    path::{Component, Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use blake3::Hasher as Blake3;
use chrono::{Local, TimeZone};

use crate::core::error::{EditError, StorageContext};

/// Expand `~`/`$VAR`, make absolute against the working directory, and fold
/// `.`/`..` lexically. The target need not exist.
pub fn normalize_path(raw: &str) -> Result<PathBuf, EditError>
{
    let trimmed = raw.trim();
    if trimmed.is_empty()
    {
        return Err(EditError::Validation("file_path must not be empty".into()));
    }

    // Fall back to tilde-only expansion when a $VAR is undefined
    let expanded = match shellexpand::full(trimmed)
    {
        Ok(s) => s.into_owned(),
        Err(_) => shellexpand::tilde(trimmed).into_owned(),
    };

    let path = PathBuf::from(expanded);
    let absolute = if path.is_absolute()
    {
        path
    }
    else
    {
        std::env::current_dir()
            .storage(|| "resolve current directory")?
            .join(path)
    };

    let mut out = PathBuf::new();
    for c in absolute.components()
    {
        match c
        {
            Component::ParentDir =>
            {
                out.pop();
            }
            Component::CurDir =>
            {}
            other => out.push(other.as_os_str()),
        }
    }

    Ok(dunce::simplified(&out).to_path_buf())
}

/// Current time in whole seconds since the UNIX epoch
pub fn unix_now() -> i64
{
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Modification time of `path` in whole seconds since the UNIX epoch
pub fn mtime_secs(meta: &fs::Metadata) -> i64
{
    meta.modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Local `%Y-%m-%d %H:%M:%S` rendering of a UNIX timestamp
pub fn format_unix(ts: i64) -> String
{
    match Local.timestamp_opt(ts, 0).single()
    {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}

/// `12.3KB` below one MiB, `4.5MB` above
pub fn human_size(bytes: u64) -> String
{
    if bytes < 1_048_576
    {
        format!("{:.1}KB", bytes as f64 / 1024.0)
    }
    else
    {
        format!("{:.1}MB", bytes as f64 / 1_048_576.0)
    }
}

/// Read a file and require UTF-8 text
pub fn read_text(path: &Path) -> Result<String, EditError>
{
    let bytes = fs::read(path).storage(|| format!("read {}", path.display()))?;
    String::from_utf8(bytes).map_err(|_| {
        EditError::Validation(format!("{} is not valid UTF-8 text", path.display()))
    })
}

/// Atomic write: same-dir tempfile, fsync, keep permissions, rename over.
pub fn write_atomic(
    path: &Path,
    data: &[u8],
) -> Result<(), EditError>
{
    let dir = path
        .parent()
        .unwrap_or_else(|| Path::new("."));

    // Preserve original permissions (fresh files get the temp file's defaults)
    let perms = fs::metadata(path)
        .map(|m| m.permissions())
        .ok();

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .storage(|| format!("create temp file in {}", dir.display()))?;

    tmp.write_all(data)
        .storage(|| format!("write temp file for {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .storage(|| format!("sync temp file for {}", path.display()))?;

    if let Some(perms) = perms
    {
        fs::set_permissions(tmp.path(), perms)
            .storage(|| format!("set permissions for {}", path.display()))?;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if !path.exists()
        {
            let _ = fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o644));
        }
    }

    tmp.persist(path)
        .map_err(|e| e.error)
        .storage(|| format!("replace {}", path.display()))?;

    let _ = sync_dir(dir);
    Ok(())
}

/// Copy `src` into a new file at `dest` (never overwrites), fsync both.
pub fn copy_durable(
    src: &Path,
    dest: &Path,
) -> Result<u64, EditError>
{
    let mut input = File::open(src).storage(|| format!("open {}", src.display()))?;
    let mut output = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .storage(|| format!("create {}", dest.display()))?;

    let copied = std::io::copy(&mut input, &mut output);
    let synced = copied.and_then(|n| output.sync_all().map(|_| n));
    match synced
    {
        Ok(n) =>
        {
            if let Some(parent) = dest.parent()
            {
                let _ = sync_dir(parent);
            }
            Ok(n)
        }
        Err(e) =>
        {
            // Leave no half-written copy behind
            drop(output);
            let _ = fs::remove_file(dest);
            Err(e).storage(|| format!("copy {} -> {}", src.display(), dest.display()))
        }
    }
}

/// Cross-platform directory fsync helper.
#[cfg(unix)]
pub fn sync_dir(p: &Path) -> std::io::Result<()>
{
    use std::os::unix::fs::OpenOptionsExt;
    let f = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_DIRECTORY)
        .open(p)?;
    f.sync_all()
}

#[cfg(windows)]
pub fn sync_dir(_p: &Path) -> std::io::Result<()>
{
    // Windows does not expose a reliable directory fsync; best-effort no-op.
    Ok(())
}

/// Stream a file into a blake3 digest as `blake3:<hex>`.
pub fn stream_blake3(path: &Path) -> Result<String, EditError>
{
    let mut f = File::open(path).storage(|| format!("open for checksum: {}", path.display()))?;
    let mut hasher = Blake3::new();
    let mut buf = [0u8; 64 * 1024];
    loop
    {
        let n = f
            .read(&mut buf)
            .storage(|| format!("read for checksum: {}", path.display()))?;
        if n == 0
        {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("blake3:{}", hasher.finalize().to_hex()))
}
