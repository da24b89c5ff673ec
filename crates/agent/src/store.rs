//! Store library target resolution
//!
//! Resolves a numeric store id (or store-protocol URI) to an installed
//! executable by reading the store client's library metadata: the library
//! folder list, the app's install manifest, and finally the executables
//! inside the install directory.

use gamerig_common::{Error, Result};
use regex_lite::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extract a numeric app id from a bare id or a store-protocol URI
pub fn extract_store_id(target: &str) -> Option<String> {
    if !target.is_empty() && target.chars().all(|c| c.is_ascii_digit()) {
        return Some(target.to_string());
    }
    if let Some(rest) = target.strip_prefix("steam://") {
        let re = Regex::new(r"(?:rungameid|run)/(\d+)").unwrap();
        if let Some(caps) = re.captures(rest) {
            return Some(caps[1].to_string());
        }
    }
    None
}

/// Resolves store app ids against one library root
pub struct StoreResolver {
    root: PathBuf,
}

impl StoreResolver {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Conventional per-OS store client installation root
    pub fn default_root() -> PathBuf {
        #[cfg(windows)]
        {
            PathBuf::from(r"C:\Program Files (x86)\Steam")
        }
        #[cfg(target_os = "macos")]
        {
            home_dir().join("Library/Application Support/Steam")
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            home_dir().join(".local/share/Steam")
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Library folders listed in `libraryfolders.vdf`, falling back to the
    /// root itself when the file is absent or lists nothing.
    fn library_folders(&self) -> Vec<PathBuf> {
        let vdf = self.root.join("steamapps").join("libraryfolders.vdf");
        match std::fs::read_to_string(&vdf) {
            Ok(content) => {
                let re = Regex::new(r#""path"\s+"([^"]+)""#).unwrap();
                let libraries: Vec<PathBuf> = re
                    .captures_iter(&content)
                    .map(|caps| PathBuf::from(caps[1].replace("\\\\", "\\")))
                    .collect();
                if libraries.is_empty() {
                    vec![self.root.clone()]
                } else {
                    libraries
                }
            }
            Err(_) => vec![self.root.clone()],
        }
    }

    /// Resolve an app id to the executable to run.
    ///
    /// Selection order inside the install directory: an executable matching
    /// `expected_process`, then one named after the install directory, then
    /// the largest executable found by recursive scan.
    pub fn resolve(&self, app_id: &str, expected_process: &str) -> Result<PathBuf> {
        let manifest_name = format!("appmanifest_{app_id}.acf");

        let mut found = None;
        for library in self.library_folders() {
            let candidate = library.join("steamapps").join(&manifest_name);
            if candidate.is_file() {
                found = Some((library, candidate));
                break;
            }
        }
        let (library, manifest) = found.ok_or_else(|| {
            Error::TargetResolution(format!("app id {app_id} is not installed (manifest not found)"))
        })?;

        let content = std::fs::read_to_string(&manifest).map_err(|e| {
            Error::TargetResolution(format!("failed to read manifest {}: {e}", manifest.display()))
        })?;
        let re = Regex::new(r#""installdir"\s+"([^"]+)""#).unwrap();
        let install_dir_name = re
            .captures(&content)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| {
                Error::TargetResolution(format!("manifest {} has no installdir", manifest.display()))
            })?;

        let game_dir = library.join("steamapps").join("common").join(&install_dir_name);
        if !game_dir.is_dir() {
            return Err(Error::TargetResolution(format!(
                "install directory does not exist: {}",
                game_dir.display()
            )));
        }

        select_executable(&game_dir, &install_dir_name, expected_process)
    }
}

fn select_executable(game_dir: &Path, install_dir_name: &str, expected: &str) -> Result<PathBuf> {
    if !expected.is_empty() {
        let file_name = format!(
            "{}.exe",
            expected.to_ascii_lowercase().trim_end_matches(".exe")
        );
        let direct = game_dir.join(&file_name);
        if direct.is_file() {
            return Ok(direct);
        }
        for entry in WalkDir::new(game_dir).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_string_lossy()
                    .eq_ignore_ascii_case(&file_name)
            {
                return Ok(entry.into_path());
            }
        }
    }

    let dir_named = game_dir.join(format!("{install_dir_name}.exe"));
    if dir_named.is_file() {
        return Ok(dir_named);
    }

    let mut best: Option<(PathBuf, u64)> = None;
    for entry in WalkDir::new(game_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let is_exe = entry
            .path()
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("exe"))
            .unwrap_or(false);
        if !is_exe {
            continue;
        }
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if best.as_ref().map_or(true, |(_, best_size)| size > *best_size) {
            best = Some((entry.into_path(), size));
        }
    }

    best.map(|(path, _)| path).ok_or_else(|| {
        Error::TargetResolution(format!(
            "no executable found in install directory {}",
            game_dir.display()
        ))
    })
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_library(root: &Path, app_id: &str, install_dir: &str) -> PathBuf {
        let steamapps = root.join("steamapps");
        fs::create_dir_all(&steamapps).unwrap();
        fs::write(
            steamapps.join(format!("appmanifest_{app_id}.acf")),
            format!(
                "\"AppState\"\n{{\n\t\"appid\"\t\t\"{app_id}\"\n\t\"installdir\"\t\t\"{install_dir}\"\n}}\n"
            ),
        )
        .unwrap();
        let game_dir = steamapps.join("common").join(install_dir);
        fs::create_dir_all(&game_dir).unwrap();
        game_dir
    }

    #[test]
    fn extracts_bare_numeric_ids() {
        assert_eq!(extract_store_id("1174180"), Some("1174180".to_string()));
        assert_eq!(extract_store_id("game.exe"), None);
        assert_eq!(extract_store_id(""), None);
    }

    #[test]
    fn extracts_ids_from_protocol_uris() {
        assert_eq!(
            extract_store_id("steam://rungameid/1174180"),
            Some("1174180".to_string())
        );
        assert_eq!(
            extract_store_id("steam://run/271590"),
            Some("271590".to_string())
        );
        assert_eq!(extract_store_id("steam://open/console"), None);
    }

    #[test]
    fn resolves_by_expected_process_name() {
        let tmp = TempDir::new().unwrap();
        let game_dir = write_library(tmp.path(), "1174180", "Red Dead Redemption 2");
        fs::write(game_dir.join("PlayRDR2.exe"), vec![0u8; 1024]).unwrap();
        fs::write(game_dir.join("rdr2.exe"), vec![0u8; 16]).unwrap();

        let resolver = StoreResolver::new(tmp.path().to_path_buf());
        let exe = resolver.resolve("1174180", "RDR2").unwrap();
        assert_eq!(exe.file_name().unwrap().to_str().unwrap(), "rdr2.exe");
    }

    #[test]
    fn resolves_by_install_dir_name() {
        let tmp = TempDir::new().unwrap();
        let game_dir = write_library(tmp.path(), "271590", "GTAV");
        fs::write(game_dir.join("GTAV.exe"), vec![0u8; 64]).unwrap();
        fs::write(game_dir.join("installer.exe"), vec![0u8; 4096]).unwrap();

        let resolver = StoreResolver::new(tmp.path().to_path_buf());
        let exe = resolver.resolve("271590", "").unwrap();
        assert_eq!(exe.file_name().unwrap().to_str().unwrap(), "GTAV.exe");
    }

    #[test]
    fn falls_back_to_largest_executable() {
        let tmp = TempDir::new().unwrap();
        let game_dir = write_library(tmp.path(), "400", "Portal");
        let nested = game_dir.join("bin");
        fs::create_dir_all(&nested).unwrap();
        fs::write(game_dir.join("crashpad.exe"), vec![0u8; 128]).unwrap();
        fs::write(nested.join("portal_main.exe"), vec![0u8; 8192]).unwrap();

        let resolver = StoreResolver::new(tmp.path().to_path_buf());
        let exe = resolver.resolve("400", "").unwrap();
        assert_eq!(
            exe.file_name().unwrap().to_str().unwrap(),
            "portal_main.exe"
        );
    }

    #[test]
    fn missing_manifest_is_a_resolution_error() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("steamapps")).unwrap();

        let resolver = StoreResolver::new(tmp.path().to_path_buf());
        let err = resolver.resolve("999999", "").unwrap_err();
        assert!(matches!(err, Error::TargetResolution(_)));
        assert!(err.to_string().contains("not installed"));
    }

    #[test]
    fn reads_additional_libraries_from_vdf() {
        let tmp = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let game_dir = write_library(second.path(), "620", "Portal 2");
        fs::write(game_dir.join("portal2.exe"), vec![0u8; 32]).unwrap();

        let steamapps = tmp.path().join("steamapps");
        fs::create_dir_all(&steamapps).unwrap();
        fs::write(
            steamapps.join("libraryfolders.vdf"),
            format!(
                "\"libraryfolders\"\n{{\n\t\"0\"\n\t{{\n\t\t\"path\"\t\t\"{}\"\n\t}}\n\t\"1\"\n\t{{\n\t\t\"path\"\t\t\"{}\"\n\t}}\n}}\n",
                tmp.path().display(),
                second.path().display()
            ),
        )
        .unwrap();

        let resolver = StoreResolver::new(tmp.path().to_path_buf());
        let exe = resolver.resolve("620", "").unwrap();
        assert!(exe.starts_with(second.path()));
    }
}
