use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::EngineError;

/// Result of packaging one dump file.
pub struct PackedArchive {
    pub path: PathBuf,
    pub size_mb: f64,
}

/// Compress a finished dump file into a single-entry zip next to it and
/// delete the uncompressed original. The entry name is the dump's file name,
/// so `shop_20260830_120000.sql` lands inside `shop_20260830_120000.zip`.
///
/// Compression failure leaves the dump file in place and is fatal to the
/// operation; the caller must not treat the raw .sql as a finished artifact.
pub fn pack(sql_path: &Path) -> Result<PackedArchive, EngineError> {
    let entry_name = sql_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| EngineError::Compression {
            path: sql_path.to_path_buf(),
            reason: "dump path has no file name".into(),
        })?
        .to_string();

    let zip_path = sql_path.with_extension("zip");
    let compress = |path: &Path| -> Result<(), EngineError> {
        let out = File::create(path)?;
        let mut archive = ZipWriter::new(BufWriter::new(out));
        archive
            .start_file(&entry_name, SimpleFileOptions::default())
            .map_err(|e| EngineError::Compression {
                path: sql_path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let mut input = BufReader::new(File::open(sql_path)?);
        io::copy(&mut input, &mut archive)?;
        archive.finish().map_err(|e| EngineError::Compression {
            path: sql_path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(())
    };

    if let Err(err) = compress(&zip_path) {
        // No partial artifact: a half-written zip must not look like a
        // finished backup.
        let _ = fs::remove_file(&zip_path);
        return Err(err);
    }

    fs::remove_file(sql_path)?;
    let size_mb = file_size_mb(&zip_path)?;

    Ok(PackedArchive {
        path: zip_path,
        size_mb,
    })
}

/// Extract the single `.sql` entry of an archive into `dest_dir` and return
/// its path. Raw `.sql` inputs are passed through untouched.
pub fn extract_dump(archive_path: &Path, dest_dir: &Path) -> Result<PathBuf, EngineError> {
    if archive_path.extension().and_then(|e| e.to_str()) != Some("zip") {
        return Ok(archive_path.to_path_buf());
    }

    let file = File::open(archive_path)?;
    let mut archive =
        zip::ZipArchive::new(BufReader::new(file)).map_err(|e| EngineError::RestoreParse(
            format!("cannot open archive {}: {e}", archive_path.display()),
        ))?;

    let entry_name = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .find(|name| name.ends_with(".sql"))
        .ok_or_else(|| {
            EngineError::RestoreParse(format!(
                "no .sql entry in {}",
                archive_path.display()
            ))
        })?;

    // Entry names are untrusted input; anything other than a plain file
    // name could resolve outside `dest_dir`.
    if entry_name.contains('/')
        || entry_name.contains('\\')
        || entry_name.contains("..")
        || Path::new(&entry_name).is_absolute()
    {
        return Err(EngineError::RestoreParse(format!(
            "refusing unsafe entry name '{entry_name}' in {}",
            archive_path.display()
        )));
    }

    let mut entry = archive
        .by_name(&entry_name)
        .map_err(|e| EngineError::RestoreParse(e.to_string()))?;
    fs::create_dir_all(dest_dir)?;
    let out_path = dest_dir.join(&entry_name);
    let mut out = BufWriter::new(File::create(&out_path)?);
    io::copy(&mut entry, &mut out)?;
    Ok(out_path)
}

/// File size in MB, rounded to two decimals.
pub fn file_size_mb(path: &Path) -> Result<f64, EngineError> {
    let bytes = fs::metadata(path)?.len();
    Ok(round_mb(bytes))
}

pub fn round_mb(bytes: u64) -> f64 {
    let mb = bytes as f64 / (1024.0 * 1024.0);
    (mb * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn pack_then_extract_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let sql_path = dir.path().join("shop_20260830_120000.sql");
        let mut f = File::create(&sql_path).unwrap();
        writeln!(f, "CREATE TABLE `clients` (`id` INT);").unwrap();
        drop(f);

        let packed = pack(&sql_path).unwrap();
        assert!(packed.path.exists());
        assert!(!sql_path.exists(), "uncompressed dump must be removed");
        assert!(packed.size_mb >= 0.0);
        assert_eq!(
            packed.path.file_name().unwrap().to_str().unwrap(),
            "shop_20260830_120000.zip"
        );

        let out_dir = tempfile::tempdir().unwrap();
        let extracted = extract_dump(&packed.path, out_dir.path()).unwrap();
        assert_eq!(
            extracted.file_name().unwrap().to_str().unwrap(),
            "shop_20260830_120000.sql"
        );
        let text = fs::read_to_string(&extracted).unwrap();
        assert!(text.contains("CREATE TABLE `clients`"));
    }

    #[test]
    fn extract_passes_raw_sql_through() {
        let dir = tempfile::tempdir().unwrap();
        let sql_path = dir.path().join("plain.sql");
        fs::write(&sql_path, "SELECT 1;").unwrap();
        let got = extract_dump(&sql_path, dir.path()).unwrap();
        assert_eq!(got, sql_path);
    }

    #[test]
    fn archive_without_sql_entry_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("bad.zip");
        let mut archive = ZipWriter::new(File::create(&zip_path).unwrap());
        archive
            .start_file("readme.txt", SimpleFileOptions::default())
            .unwrap();
        archive.write_all(b"nothing here").unwrap();
        archive.finish().unwrap();

        assert!(extract_dump(&zip_path, dir.path()).is_err());
    }

    #[test]
    fn traversal_entry_names_never_escape_the_destination() {
        let root = tempfile::tempdir().unwrap();
        let zip_path = root.path().join("evil.zip");
        let mut archive = ZipWriter::new(File::create(&zip_path).unwrap());
        archive
            .start_file("../outside.sql", SimpleFileOptions::default())
            .unwrap();
        archive.write_all(b"DROP DATABASE `shop`;").unwrap();
        archive.finish().unwrap();

        let dest = root.path().join("dest");
        fs::create_dir_all(&dest).unwrap();
        assert!(extract_dump(&zip_path, &dest).is_err());
        assert!(!root.path().join("outside.sql").exists());
    }

    #[test]
    fn absolute_entry_names_are_rejected() {
        let root = tempfile::tempdir().unwrap();
        let zip_path = root.path().join("abs.zip");
        let mut archive = ZipWriter::new(File::create(&zip_path).unwrap());
        archive
            .start_file("/tmp/planted.sql", SimpleFileOptions::default())
            .unwrap();
        archive.write_all(b"SELECT 1;").unwrap();
        archive.finish().unwrap();

        assert!(extract_dump(&zip_path, root.path()).is_err());
    }

    #[test]
    fn mb_rounding_is_two_decimals() {
        assert_eq!(round_mb(1024 * 1024), 1.0);
        assert_eq!(round_mb(1536 * 1024), 1.5);
        assert_eq!(round_mb(0), 0.0);
    }
}
