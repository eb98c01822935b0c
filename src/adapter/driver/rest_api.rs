use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use uuid::Uuid;

use crate::adapter::driver::auth::AuthenticatedActor;
use crate::adapter::driver::request_dto::{
    AttachPaymentSessionRequest, CreateHoldRequest, CreateUnitRequest, ExtendHoldRequest,
    PaymentWebhookRequest, ResizeCapacityRequest,
};
use crate::adapter::driver::response_dto::{
    HoldResponse, SweepResponse, UnitResponse, WebhookResponse,
};
use crate::application::service::{
    InventoryApplicationService, PaymentEventKind, ReservationService, SettlementOutcome,
    SettlementService,
};
use crate::application::{ApplicationError, ExpirySweeper, RateLimiter};
use crate::domain::error::DomainError;
use crate::domain::model::{HoldId, RentalPeriod, SessionRef, UnitId, UnitKind};
use crate::domain::port::RepositoryError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

// アプリケーションサービスを含む状態
pub type AppState = AppStateInner;

#[derive(Clone)]
pub struct AppStateInner {
    pub reservation_service: Arc<ReservationService>,
    pub inventory_service: Arc<InventoryApplicationService>,
    pub settlement_service: Arc<SettlementService>,
    pub sweeper: Arc<ExpirySweeper>,
    pub rate_limiter: Arc<RateLimiter>,
}

// REST APIルーターを作成
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/inventory", post(create_unit).get(list_units))
        .route("/inventory/:unit_id", get(get_unit))
        .route("/inventory/:unit_id/capacity", put(resize_capacity))
        .route("/inventory/:unit_id/holds", get(list_holds_for_unit))
        .route("/holds", post(create_hold))
        .route("/holds/:hold_id", get(get_hold))
        .route("/holds/:hold_id/payment-session", post(attach_payment_session))
        .route("/holds/:hold_id/cancel", post(cancel_hold))
        .route("/holds/:hold_id/extend", post(extend_hold))
        .route("/webhooks/payments", post(payment_webhook))
        .route("/admin/sweep", post(run_sweep))
}

// ヘルスチェックエンドポイント
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "tour-booking-reservation",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// 在庫ユニット登録エンドポイント（管理者）
async fn create_unit(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(request): Json<CreateUnitRequest>,
) -> ApiResult<(StatusCode, Json<UnitResponse>)> {
    let kind = UnitKind::from_string(&request.kind).map_err(map_domain_error)?;
    let period = match (request.period_starts_at, request.period_ends_at) {
        (Some(starts_at), Some(ends_at)) => {
            Some(RentalPeriod::new(starts_at, ends_at).map_err(map_domain_error)?)
        }
        (None, None) => None,
        _ => {
            return Err(bad_request(
                "period_starts_at と period_ends_at は両方指定してください",
                "INVALID_PERIOD",
            ))
        }
    };

    match state
        .inventory_service
        .create_unit(&actor, kind, request.name, request.total_capacity, period)
        .await
    {
        Ok(unit) => Ok((StatusCode::CREATED, Json(UnitResponse::from_unit(&unit)))),
        Err(err) => Err(map_application_error(err)),
    }
}

// 在庫ユニット一覧取得エンドポイント
async fn list_units(
    State(state): State<AppState>,
    AuthenticatedActor(_actor): AuthenticatedActor,
) -> ApiResult<Json<Vec<UnitResponse>>> {
    match state.inventory_service.list_units().await {
        Ok(units) => Ok(Json(units.iter().map(UnitResponse::from_unit).collect())),
        Err(err) => Err(map_application_error(err)),
    }
}

// 在庫ユニット詳細取得エンドポイント
async fn get_unit(
    State(state): State<AppState>,
    AuthenticatedActor(_actor): AuthenticatedActor,
    Path(unit_id): Path<Uuid>,
) -> ApiResult<Json<UnitResponse>> {
    match state
        .inventory_service
        .get_unit(UnitId::from_uuid(unit_id))
        .await
    {
        Ok(Some(unit)) => Ok(Json(UnitResponse::from_unit(&unit))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ApiError {
                error: "指定された在庫ユニットが見つかりません".to_string(),
                code: "UNIT_NOT_FOUND".to_string(),
            }),
        )),
        Err(err) => Err(map_application_error(err)),
    }
}

// 定員変更エンドポイント（管理者）
async fn resize_capacity(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(unit_id): Path<Uuid>,
    Json(request): Json<ResizeCapacityRequest>,
) -> ApiResult<Json<UnitResponse>> {
    match state
        .inventory_service
        .resize_capacity(&actor, UnitId::from_uuid(unit_id), request.total_capacity)
        .await
    {
        Ok(unit) => Ok(Json(UnitResponse::from_unit(&unit))),
        Err(err) => Err(map_application_error(err)),
    }
}

// 在庫ユニットのホールド一覧取得エンドポイント（管理者）
async fn list_holds_for_unit(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(unit_id): Path<Uuid>,
) -> ApiResult<Json<Vec<HoldResponse>>> {
    match state
        .reservation_service
        .list_holds_for_unit(&actor, UnitId::from_uuid(unit_id))
        .await
    {
        Ok(holds) => Ok(Json(holds.iter().map(HoldResponse::from_hold).collect())),
        Err(err) => Err(map_application_error(err)),
    }
}

// ホールド作成エンドポイント（アクターごとにレート制限）
async fn create_hold(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Json(request): Json<CreateHoldRequest>,
) -> ApiResult<(StatusCode, Json<HoldResponse>)> {
    state
        .rate_limiter
        .check(actor.id())
        .map_err(map_application_error)?;

    let hold_duration = request
        .hold_duration_secs
        .map(seconds_to_duration)
        .transpose()?;

    match state
        .reservation_service
        .reserve(
            &actor,
            UnitId::from_uuid(request.unit_id),
            request.quantity,
            hold_duration,
        )
        .await
    {
        Ok(hold) => Ok((StatusCode::CREATED, Json(HoldResponse::from_hold(&hold)))),
        Err(err) => Err(map_application_error(err)),
    }
}

// ホールド詳細取得エンドポイント（所有者・管理者）
async fn get_hold(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(hold_id): Path<Uuid>,
) -> ApiResult<Json<HoldResponse>> {
    match state
        .reservation_service
        .get_hold(&actor, HoldId::from_uuid(hold_id))
        .await
    {
        Ok(hold) => Ok(Json(HoldResponse::from_hold(&hold))),
        Err(err) => Err(map_application_error(err)),
    }
}

// 決済セッション紐付けエンドポイント（所有者・管理者）
async fn attach_payment_session(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(hold_id): Path<Uuid>,
    Json(request): Json<AttachPaymentSessionRequest>,
) -> ApiResult<Json<HoldResponse>> {
    let session = SessionRef::new(request.session_ref).map_err(map_domain_error)?;

    match state
        .reservation_service
        .attach_payment_session(&actor, HoldId::from_uuid(hold_id), session)
        .await
    {
        Ok(hold) => Ok(Json(HoldResponse::from_hold(&hold))),
        Err(err) => Err(map_application_error(err)),
    }
}

// ホールドキャンセルエンドポイント（所有者・管理者）
async fn cancel_hold(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(hold_id): Path<Uuid>,
) -> ApiResult<Json<HoldResponse>> {
    match state
        .reservation_service
        .cancel(&actor, HoldId::from_uuid(hold_id))
        .await
    {
        Ok(hold) => Ok(Json(HoldResponse::from_hold(&hold))),
        Err(err) => Err(map_application_error(err)),
    }
}

// ホールド延長エンドポイント（管理者）
async fn extend_hold(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
    Path(hold_id): Path<Uuid>,
    Json(request): Json<ExtendHoldRequest>,
) -> ApiResult<Json<HoldResponse>> {
    let additional = seconds_to_duration(request.additional_secs)?;

    match state
        .reservation_service
        .extend(&actor, HoldId::from_uuid(hold_id), additional)
        .await
    {
        Ok(hold) => Ok(Json(HoldResponse::from_hold(&hold))),
        Err(err) => Err(map_application_error(err)),
    }
}

// 決済結果Webhookエンドポイント
// HoldNotFoundは再送させないため200で受理する
async fn payment_webhook(
    State(state): State<AppState>,
    Json(request): Json<PaymentWebhookRequest>,
) -> ApiResult<Json<WebhookResponse>> {
    let session = SessionRef::new(request.session_ref).map_err(map_domain_error)?;
    let kind = PaymentEventKind::parse(&request.event_type);
    tracing::debug!(
        event_id = %request.event_id,
        event_type = %request.event_type,
        payment_session = %session,
        "payment webhook received"
    );

    match state.settlement_service.apply(&kind, &session).await {
        Ok(outcome) => Ok(Json(webhook_response(outcome))),
        Err(ApplicationError::HoldNotFound(_)) => Ok(Json(WebhookResponse::ignored())),
        Err(err) => Err(map_application_error(err)),
    }
}

// 手動スイープエンドポイント（管理者）
async fn run_sweep(
    State(state): State<AppState>,
    AuthenticatedActor(actor): AuthenticatedActor,
) -> ApiResult<Json<SweepResponse>> {
    if !actor.is_admin() {
        return Err(map_application_error(ApplicationError::Forbidden(
            "スイープは管理者のみ実行できます".to_string(),
        )));
    }

    match state.sweeper.sweep(Utc::now()).await {
        Ok(report) => Ok(Json(SweepResponse::from(report))),
        Err(err) => Err(map_application_error(err)),
    }
}

fn webhook_response(outcome: SettlementOutcome) -> WebhookResponse {
    match outcome {
        SettlementOutcome::Confirmed(hold) => {
            WebhookResponse::new("confirmed", Some(hold.id().to_string()))
        }
        SettlementOutcome::AlreadyConfirmed(hold_id) => {
            WebhookResponse::new("already_confirmed", Some(hold_id.to_string()))
        }
        SettlementOutcome::Released(hold) => {
            WebhookResponse::new("released", Some(hold.id().to_string()))
        }
        SettlementOutcome::AlreadyReleased(hold_id) => {
            WebhookResponse::new("already_released", Some(hold_id.to_string()))
        }
        SettlementOutcome::Ignored => WebhookResponse::ignored(),
    }
}

fn seconds_to_duration(secs: u64) -> ApiResult<chrono::Duration> {
    chrono::Duration::from_std(std::time::Duration::from_secs(secs))
        .map_err(|_| bad_request("秒数が大きすぎます", "INVALID_VALUE"))
}

fn bad_request(message: &str, code: &str) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            error: message.to_string(),
            code: code.to_string(),
        }),
    )
}

// アプリケーションエラーをHTTPエラーにマッピング
fn map_application_error(err: ApplicationError) -> (StatusCode, Json<ApiError>) {
    match err {
        ApplicationError::DomainError(domain_err) => map_domain_error(domain_err),
        ApplicationError::RepositoryError(repo_err) => {
            let status = match &repo_err {
                RepositoryError::ConnectionFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(ApiError {
                    error: format!("{}", repo_err),
                    code: "REPOSITORY_ERROR".to_string(),
                }),
            )
        }
        ApplicationError::NotFound(msg) => (
            StatusCode::NOT_FOUND,
            Json(ApiError {
                error: msg,
                code: "NOT_FOUND".to_string(),
            }),
        ),
        ApplicationError::HoldNotFound(msg) => (
            StatusCode::NOT_FOUND,
            Json(ApiError {
                error: msg,
                code: "HOLD_NOT_FOUND".to_string(),
            }),
        ),
        ApplicationError::Forbidden(msg) => (
            StatusCode::FORBIDDEN,
            Json(ApiError {
                error: msg,
                code: "FORBIDDEN".to_string(),
            }),
        ),
        ApplicationError::RateLimited { retry_after_secs } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ApiError {
                error: format!(
                    "リクエストが多すぎます。{}秒後に再試行してください",
                    retry_after_secs
                ),
                code: "RATE_LIMITED".to_string(),
            }),
        ),
    }
}

// ドメインエラーを適切なHTTPステータスコードとエラーコードにマッピング
fn map_domain_error(domain_err: DomainError) -> (StatusCode, Json<ApiError>) {
    match domain_err {
        DomainError::InvalidHoldState(msg) => (
            StatusCode::CONFLICT,
            Json(ApiError {
                error: msg,
                code: "INVALID_HOLD_STATE".to_string(),
            }),
        ),
        err @ DomainError::InsufficientCapacity { .. } => (
            StatusCode::CONFLICT,
            Json(ApiError {
                error: err.to_string(),
                code: "INSUFFICIENT_CAPACITY".to_string(),
            }),
        ),
        DomainError::InvalidQuantity => (
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                error: "無効な数量です".to_string(),
                code: "INVALID_QUANTITY".to_string(),
            }),
        ),
        DomainError::InvalidCapacity(msg) => (
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                error: msg,
                code: "INVALID_CAPACITY".to_string(),
            }),
        ),
        DomainError::InvariantViolation(msg) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError {
                error: msg,
                code: "INVARIANT_VIOLATION".to_string(),
            }),
        ),
        DomainError::InvalidValue(msg) => (
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                error: msg,
                code: "INVALID_VALUE".to_string(),
            }),
        ),
    }
}
