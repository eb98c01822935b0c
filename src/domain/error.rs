/// ドメイン層のエラー型
/// ビジネスルール違反を表現する
#[derive(Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 無効なホールド状態（例: 確定済みのホールドをキャンセルしようとした）
    InvalidHoldState(String),
    /// 残席・残枠不足
    InsufficientCapacity { requested: u32, remaining: u32 },
    /// 無効な数量（例: 0の数量）
    InvalidQuantity,
    /// 無効な定員（例: 予約済み数を下回る定員変更）
    InvalidCapacity(String),
    /// 不変条件違反（残数が [0, 定員] の範囲外）
    /// バグを示すため、必ず大きく記録すること
    InvariantViolation(String),
    /// 無効な値
    InvalidValue(String),
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainError::InvalidHoldState(msg) => write!(f, "Invalid hold state: {}", msg),
            DomainError::InsufficientCapacity {
                requested,
                remaining,
            } => write!(
                f,
                "Insufficient capacity: requested {}, remaining {}",
                requested, remaining
            ),
            DomainError::InvalidQuantity => write!(f, "Invalid quantity"),
            DomainError::InvalidCapacity(msg) => write!(f, "Invalid capacity: {}", msg),
            DomainError::InvariantViolation(msg) => write!(f, "Invariant violation: {}", msg),
            DomainError::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
        }
    }
}

impl std::error::Error for DomainError {}
