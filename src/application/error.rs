use crate::domain::error::DomainError;
use crate::domain::port::RepositoryError;

/// アプリケーション層のエラー型
/// ドメインエラー、リポジトリエラー、認可・流量制御の失敗をラップする
#[derive(Debug)]
pub enum ApplicationError {
    /// ドメインエラー（ビジネスルール違反）
    DomainError(DomainError),
    /// リポジトリエラー（永続化の失敗）
    RepositoryError(RepositoryError),
    /// エンティティが見つからない
    NotFound(String),
    /// 決済セッション参照に対応するPendingのホールドが存在しない
    /// 決済コラボレーターには再送不要として扱わせる
    HoldNotFound(String),
    /// 操作する権限がない
    Forbidden(String),
    /// 単位時間あたりのリクエスト数の上限を超えた
    RateLimited { retry_after_secs: u64 },
}

impl std::fmt::Display for ApplicationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplicationError::DomainError(err) => write!(f, "Domain error: {}", err),
            ApplicationError::RepositoryError(err) => write!(f, "Repository error: {}", err),
            ApplicationError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApplicationError::HoldNotFound(msg) => write!(f, "Hold not found: {}", msg),
            ApplicationError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApplicationError::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited: retry after {} seconds", retry_after_secs)
            }
        }
    }
}

impl std::error::Error for ApplicationError {}

// From実装でエラー変換を簡潔に
impl From<DomainError> for ApplicationError {
    fn from(err: DomainError) -> Self {
        ApplicationError::DomainError(err)
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(err: RepositoryError) -> Self {
        ApplicationError::RepositoryError(err)
    }
}
