use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: vandelay.local.kdl, vandelay.kdl（先頭ドット付きも可）\n\
        - ./.vandelay/ ディレクトリ（状態ファイルと同じ場所）\n\
        - ~/.config/vandelay/ ディレクトリ\n\
        または VANDELAY_CONFIG_PATH 環境変数で直接指定できます"
    )]
    StackFileNotFound,

    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("不明なバリアント: {0} (search-only または search-plus-storage を指定してください)")]
    UnknownVariant(String),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
