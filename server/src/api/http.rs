use axum::{
    extract::{Path, Query, State as AxumState},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use stakehouse_types::{Error, JobStatus, PaymentJob, SettlementRequest};

use crate::api::eq_constant_time;
use crate::stake::{build_stake_transaction, encode_unsigned, parse_address};
use crate::Service;

#[derive(Serialize)]
struct HealthzResponse {
    ok: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StakeBody {
    lobby_id: String,
    player_address: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StakeResponse {
    is_free: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    escrow_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stake_lamports: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PayoutBody {
    escrow_address: String,
    winner_address: String,
    total_pot: u64,
    house_cut_fraction: Option<f64>,
    #[serde(default)]
    enqueue: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PayoutResponse {
    signature: String,
    winner_amount: u64,
    house_amount: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RefundBody {
    escrow_address: String,
    recipient_address: String,
    amount: u64,
    #[serde(default)]
    enqueue: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefundResponse {
    signature: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnqueuedResponse {
    job_id: String,
    status: &'static str,
}

#[derive(Deserialize)]
pub(super) struct ListJobsQuery {
    status: Option<String>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct ListJobsResponse {
    jobs: Vec<PaymentJob>,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

pub(super) async fn healthz() -> Response {
    Json(HealthzResponse { ok: true }).into_response()
}

/// Builds the unsigned player→escrow stake transaction, or reports the
/// match as free when the lobby carries no stake. Public: players have no
/// credential beyond their own signature on the returned transaction.
pub(super) async fn stake(
    AxumState(service): AxumState<Arc<Service>>,
    Json(body): Json<StakeBody>,
) -> Response {
    service.http_metrics().inc_stake_requests();

    let Some(lobby) = service.lobbies().get(&body.lobby_id) else {
        return error_response(&Error::not_found(format!("lobby {}", body.lobby_id)));
    };
    let player = match parse_address("player", &body.player_address) {
        Ok(player) => player,
        Err(err) => return error_response(&err),
    };

    // Free match: no transaction is ever produced for a zero stake.
    if lobby.stake_lamports == 0 {
        service.http_metrics().inc_stake_free();
        return Json(StakeResponse {
            is_free: true,
            transaction: None,
            escrow_address: None,
            stake_lamports: None,
        })
        .into_response();
    }

    let wallet = match service.wallets().active() {
        Ok(wallet) => wallet,
        Err(err) => return error_response(&err),
    };
    let escrow = wallet.address();
    let blockhash = match service.ledger().latest_blockhash().await {
        Ok(blockhash) => blockhash,
        Err(err) => return error_response(&err),
    };
    let transaction =
        match build_stake_transaction(&player, &escrow, lobby.stake_lamports, blockhash) {
            Ok(transaction) => transaction,
            Err(err) => return error_response(&err),
        };
    let encoded = match encode_unsigned(&transaction) {
        Ok(encoded) => encoded,
        Err(err) => return error_response(&err),
    };

    Json(StakeResponse {
        is_free: false,
        transaction: Some(encoded),
        escrow_address: Some(escrow.to_string()),
        stake_lamports: Some(lobby.stake_lamports),
    })
    .into_response()
}

pub(super) async fn settlement_payout(
    headers: HeaderMap,
    AxumState(service): AxumState<Arc<Service>>,
    Json(body): Json<PayoutBody>,
) -> Response {
    if let Some(rejection) = settlement_auth_error(&headers, &service) {
        return rejection;
    }

    let house_cut = body
        .house_cut_fraction
        .unwrap_or(service.config.default_house_cut);
    let request = SettlementRequest::Payout {
        escrow: body.escrow_address,
        winner: body.winner_address,
        total_pot: body.total_pot,
        house_cut,
    };

    if body.enqueue {
        return enqueue_response(&service, &request);
    }

    match service.engine().execute(&request).await {
        Ok(stakehouse_types::SettlementResult::Payout {
            signature,
            winner_amount,
            house_amount,
        }) => {
            service.http_metrics().inc_payouts_settled();
            Json(PayoutResponse {
                signature,
                winner_amount,
                house_amount,
            })
            .into_response()
        }
        Ok(other) => {
            // Unreachable: a payout request settles as a payout.
            error_response(&Error::SettlementFailure(format!(
                "unexpected settlement result: {other:?}"
            )))
        }
        Err(err) => {
            service.http_metrics().inc_settlement_errors();
            error_response(&err)
        }
    }
}

pub(super) async fn settlement_refund(
    headers: HeaderMap,
    AxumState(service): AxumState<Arc<Service>>,
    Json(body): Json<RefundBody>,
) -> Response {
    if let Some(rejection) = settlement_auth_error(&headers, &service) {
        return rejection;
    }

    let request = SettlementRequest::Refund {
        escrow: body.escrow_address,
        recipient: body.recipient_address,
        amount: body.amount,
    };

    if body.enqueue {
        return enqueue_response(&service, &request);
    }

    match service.engine().execute(&request).await {
        Ok(result) => {
            service.http_metrics().inc_refunds_settled();
            Json(RefundResponse {
                signature: result.signature().to_string(),
            })
            .into_response()
        }
        Err(err) => {
            service.http_metrics().inc_settlement_errors();
            error_response(&err)
        }
    }
}

/// Operator triage listing. Defaults to `failed` so the jobs needing
/// attention surface without any query parameters.
pub(super) async fn list_payment_jobs(
    headers: HeaderMap,
    AxumState(service): AxumState<Arc<Service>>,
    Query(query): Query<ListJobsQuery>,
) -> Response {
    if let Some(rejection) = settlement_auth_error(&headers, &service) {
        return rejection;
    }

    let status = match query.status.as_deref() {
        None => JobStatus::Failed,
        Some(value) => match value.parse::<JobStatus>() {
            Ok(status) => status,
            Err(err) => return error_response(&Error::validation(err)),
        },
    };
    let limit = query.limit.unwrap_or(crate::jobs::MAX_LIST_LIMIT);

    match service.jobs().list(status, limit) {
        Ok(jobs) => Json(ListJobsResponse { jobs }).into_response(),
        Err(err) => error_response(&err),
    }
}

/// Operator-initiated `failed → pending` reset. The only path back into
/// the queue for a failed settlement.
pub(super) async fn retry_payment_job(
    headers: HeaderMap,
    AxumState(service): AxumState<Arc<Service>>,
    Path(id): Path<String>,
) -> Response {
    if let Some(rejection) = settlement_auth_error(&headers, &service) {
        return rejection;
    }

    match service.jobs().reset_for_retry(&id) {
        Ok(()) => {
            service.http_metrics().inc_jobs_retried();
            tracing::info!(job_id = %id, "payment job reset for retry");
            Json(OkResponse { ok: true }).into_response()
        }
        Err(err) => error_response(&err),
    }
}

pub(super) async fn http_metrics(
    headers: HeaderMap,
    AxumState(service): AxumState<Arc<Service>>,
) -> Response {
    if let Some(rejection) = settlement_auth_error(&headers, &service) {
        return rejection;
    }
    Json(service.http_metrics().snapshot()).into_response()
}

fn enqueue_response(service: &Service, request: &SettlementRequest) -> Response {
    match service.enqueue_settlement(request) {
        Ok(job) => (
            StatusCode::ACCEPTED,
            Json(EnqueuedResponse {
                job_id: job.id,
                status: "pending",
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

/// Checks the shared settlement secret (`x-settlement-secret` header or
/// `Authorization: Bearer`). A mismatch is a security event: it is logged
/// and nothing downstream runs.
fn settlement_auth_error(headers: &HeaderMap, service: &Service) -> Option<Response> {
    let secret = service.config.settlement_secret.as_bytes();
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    let header_token = headers
        .get("x-settlement-secret")
        .and_then(|value| value.to_str().ok());
    let authorized = header_token
        .into_iter()
        .chain(bearer)
        .any(|token| eq_constant_time(token.as_bytes(), secret));
    if authorized {
        None
    } else {
        tracing::warn!("settlement call rejected: missing or invalid shared secret");
        Some(error_response(&Error::Auth(
            "missing or invalid settlement secret".into(),
        )))
    }
}

fn error_response(err: &Error) -> Response {
    let status = match err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Auth(_) => StatusCode::UNAUTHORIZED,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Configuration(_)
        | Error::InsufficientFunds(_)
        | Error::Transient(_)
        | Error::SettlementFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: err.class(),
            message: err.to_string(),
        }),
    )
        .into_response()
}
