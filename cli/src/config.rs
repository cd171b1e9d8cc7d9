//! Configuration and profile storage for the Umbra CLI

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use umbra_core::{Address, ChainConfig, GeneratedKeys, StealthKeys};

/// Default directory for CLI state
const UMBRA_DIR: &str = ".umbra";
const PROFILE_FILE: &str = "profile.json";
const WALLET_FILE: &str = "wallet.enc";
const CACHE_FILE: &str = "sends.json";

/// Public half of the local account, readable without a password
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Checksummed wallet address
    pub address: String,
    pub spending_public_key: String,
    pub viewing_public_key: String,
    pub created_at: String,
}

impl Profile {
    pub fn new(address: Address, keys: &GeneratedKeys) -> Self {
        Self {
            address: address.to_checksum(),
            spending_public_key: keys.spending_key_pair.public_key_hex(),
            viewing_public_key: keys.viewing_key_pair.public_key_hex(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn stealth_keys(&self) -> Result<StealthKeys> {
        StealthKeys::from_hex(&self.spending_public_key, &self.viewing_public_key)
            .context("Profile holds invalid stealth keys")
    }
}

/// Get the CLI state directory
pub fn umbra_dir() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Could not find home directory")?
        .join(UMBRA_DIR))
}

pub fn profile_file() -> Result<PathBuf> {
    Ok(umbra_dir()?.join(PROFILE_FILE))
}

pub fn wallet_file() -> Result<PathBuf> {
    Ok(umbra_dir()?.join(WALLET_FILE))
}

/// Encrypted send history
pub fn cache_file() -> Result<PathBuf> {
    Ok(umbra_dir()?.join(CACHE_FILE))
}

/// Write `contents` readable by the owner only
///
/// New files are created with mode 0600. Existing files are narrowed to
/// 0600 before anything is written to them.
pub fn write_private(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create umbra directory")?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn save_profile_to(path: &Path, profile: &Profile) -> Result<()> {
    write_private(path, &serde_json::to_string_pretty(profile)?)
}

pub fn load_profile_from(path: &Path) -> Result<Profile> {
    if !path.exists() {
        bail!("No Umbra profile found. Run 'umbra keygen' first.");
    }
    let json = fs::read_to_string(path).context("Failed to read profile")?;
    serde_json::from_str(&json).context("Failed to parse profile")
}

pub fn load_profile() -> Result<Profile> {
    load_profile_from(&profile_file()?)
}

/// Chain config from a JSON file, or from the registry by chain id
pub fn load_chain_config(chain_id: u64, path: Option<&Path>) -> Result<ChainConfig> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read chain config {}", path.display()))?;
            let value: Value = serde_json::from_str(&json).context("Chain config is not valid JSON")?;
            Ok(ChainConfig::from_json(&value)?)
        }
        None => Ok(ChainConfig::for_chain_id(chain_id)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use umbra_core::KeyPair;

    #[test]
    fn test_profile_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profile.json");
        let keys = GeneratedKeys {
            spending_key_pair: KeyPair::random(),
            viewing_key_pair: KeyPair::random(),
        };
        let profile = Profile::new(Address([0x11; 20]), &keys);

        save_profile_to(&path, &profile).unwrap();
        let loaded = load_profile_from(&path).unwrap();
        assert_eq!(loaded, profile);
        assert_eq!(loaded.stealth_keys().unwrap(), keys.stealth_keys());
    }

    #[test]
    fn test_missing_profile_points_to_keygen() {
        let dir = tempdir().unwrap();
        let err = load_profile_from(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("umbra keygen"));
    }

    #[test]
    fn test_chain_config_sources() {
        assert_eq!(load_chain_config(137, None).unwrap().start_block, 20_717_318);
        assert!(load_chain_config(999, None).is_err());

        let dir = tempdir().unwrap();
        let path = dir.path().join("chain.json");
        fs::write(
            &path,
            r#"{"chainId": 31337, "startBlock": 0, "subgraphUrl": false,
                "umbraAddress": "0xFb2dc580Eed955B528407b4d36FfaFe3da685401",
                "batchSendAddress": "0xDbD0f5EBAdA6632Dde7d47713ea200a7C2ff91EB"}"#,
        )
        .unwrap();
        assert_eq!(load_chain_config(1, Some(&path)).unwrap().chain_id, 31337);

        fs::write(&path, r#"{"chainId": 1}"#).unwrap();
        let err = load_chain_config(1, Some(&path)).unwrap_err();
        assert_eq!(err.to_string(), "Invalid start block provided in chainConfig. Got 'undefined'");
    }

    #[cfg(unix)]
    #[test]
    fn test_private_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("secret.json");
        write_private(&path, "{}").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrite_narrows_existing_file() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("secret.json");
        fs::write(&path, "a much longer previous value").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        write_private(&path, "{}").unwrap();
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o777, 0o600);
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }
}
