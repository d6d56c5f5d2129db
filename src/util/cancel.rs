use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::model::error::{AssetError, AssetResult};

/// Runs `fut` until it completes or `ct` fires, whichever happens first.
///
/// A token that is already cancelled wins, so nothing is sent to the backend.
pub async fn run_cancellable<F, T>(ct: &CancellationToken, subject: &str, fut: F) -> AssetResult<T>
where
    F: Future<Output = AssetResult<T>>,
{
    tokio::select! {
        biased;
        _ = ct.cancelled() => Err(AssetError::Cancelled {
            subject: subject.to_string(),
        }),
        res = fut => res,
    }
}
