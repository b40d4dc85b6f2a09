pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{StackSettings, Variant, load_settings, parse_settings, validate_stack_name};

use std::path::{Path, PathBuf};

/// 設定ファイルのパスを直接指定する環境変数
pub const CONFIG_PATH_ENV: &str = "VANDELAY_CONFIG_PATH";

/// 設定ファイル名（優先順）
///
/// `*.local.kdl` は共有ファイルより優先される個人用の上書きです。
pub const SETTINGS_FILE_NAMES: [&str; 4] = [
    "vandelay.local.kdl",
    ".vandelay.local.kdl",
    "vandelay.kdl",
    ".vandelay.kdl",
];

/// プロジェクトのvandelay.kdlファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 VANDELAY_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ
/// 3. 状態ディレクトリ `./.vandelay/`（state.json と同じ場所）
/// 4. ~/.config/vandelay/ (グローバル設定)
pub fn find_stack_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.is_file() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "{} points to a missing file", CONFIG_PATH_ENV);
    }

    let current_dir = std::env::current_dir()?;
    let global_dir = dirs::config_dir().map(|dir| dir.join("vandelay"));
    find_stack_file_in(&current_dir, global_dir.as_deref())
        .ok_or(ConfigError::StackFileNotFound)
}

/// プロジェクトルートとグローバル設定ディレクトリから設定ファイルを探す
pub fn find_stack_file_in(project_root: &Path, global_dir: Option<&Path>) -> Option<PathBuf> {
    let state_dir = project_root.join(settings::DEFAULT_STATE_DIR);
    let search_dirs = [Some(project_root), Some(state_dir.as_path()), global_dir];

    search_dirs.into_iter().flatten().find_map(|dir| {
        SETTINGS_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    })
}

/// スタック設定を読み込む
///
/// 設定ファイルが見つからない場合はデフォルト設定を使用します。
/// アカウント・リージョンが未指定なら `CDK_DEFAULT_*` 環境変数で補完します。
pub fn load() -> Result<StackSettings> {
    let settings = match find_stack_file() {
        Ok(path) => load_settings(&path)?,
        Err(ConfigError::StackFileNotFound) => {
            tracing::debug!("No stack file found, using default settings");
            StackSettings::default()
        }
        Err(e) => return Err(e),
    };

    Ok(settings.with_env_defaults())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::ffi::OsStr;
    use std::fs;

    #[test]
    fn test_local_override_wins_over_shared_file() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("vandelay.kdl"), r#"stack "Shared""#).unwrap();
        fs::write(root.path().join(".vandelay.local.kdl"), r#"stack "Mine""#).unwrap();

        let found = find_stack_file_in(root.path(), None).unwrap();
        assert!(found.ends_with(".vandelay.local.kdl"));
        assert_eq!(load_settings(found).unwrap().stack_name, "Mine");
    }

    #[test]
    fn test_settings_next_to_state_file() {
        let root = tempfile::tempdir().unwrap();
        let state_dir = root.path().join(".vandelay");
        fs::create_dir(&state_dir).unwrap();
        fs::write(state_dir.join("state.json"), "{}").unwrap();
        fs::write(state_dir.join("vandelay.kdl"), "// in state dir").unwrap();

        let found = find_stack_file_in(root.path(), None).unwrap();
        assert_eq!(found, state_dir.join("vandelay.kdl"));

        // プロジェクト直下のファイルが優先される
        fs::write(root.path().join("vandelay.kdl"), "// root").unwrap();
        assert_eq!(
            find_stack_file_in(root.path(), None).unwrap(),
            root.path().join("vandelay.kdl")
        );
    }

    #[test]
    fn test_global_settings_are_last_resort() {
        let root = tempfile::tempdir().unwrap();
        let global = tempfile::tempdir().unwrap();

        assert!(find_stack_file_in(root.path(), Some(global.path())).is_none());

        fs::write(global.path().join("vandelay.kdl"), "// global").unwrap();
        assert_eq!(
            find_stack_file_in(root.path(), Some(global.path())).unwrap(),
            global.path().join("vandelay.kdl")
        );
    }

    #[test]
    fn test_directories_are_not_settings_files() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("vandelay.kdl")).unwrap();
        assert!(find_stack_file_in(root.path(), None).is_none());
    }

    #[test]
    #[serial]
    fn test_find_stack_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.kdl");
        fs::write(&config_path, "// custom").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(config_path.as_os_str()), || {
            let result = find_stack_file().unwrap();
            assert_eq!(result, config_path);
        });
    }

    #[test]
    #[serial]
    fn test_load_reads_settings_file_and_env_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("vandelay.kdl");
        fs::write(
            &config_path,
            r#"stack "SearchDev" { variant "search-only"; region "eu-west-1" }"#,
        )
        .unwrap();

        temp_env::with_vars(
            [
                (CONFIG_PATH_ENV, Some(config_path.as_os_str())),
                (settings::ACCOUNT_ENV, Some(OsStr::new("123456789012"))),
                (settings::REGION_ENV, Some(OsStr::new("us-east-1"))),
            ],
            || {
                let loaded = load().unwrap();
                assert_eq!(loaded.stack_name, "SearchDev");
                assert_eq!(loaded.variant, Variant::SearchOnly);
                assert_eq!(loaded.account.as_deref(), Some("123456789012"));
                // ファイルの値が環境変数より優先される
                assert_eq!(loaded.region.as_deref(), Some("eu-west-1"));
            },
        );
    }
}
