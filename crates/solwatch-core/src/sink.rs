// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of Solwatch.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use solwatch_types::NormalizedRecord;

use crate::errors::SinkError;
use crate::traits::TimeSeriesSink;

/// Write a batch, creating the backing storage on demand.
///
/// A missing-storage failure triggers exactly one `create_storage` followed
/// by exactly one retry. Any other failure, or a failure of the retry, is
/// returned and the batch is lost.
pub async fn write_with_recovery<S>(sink: &S, records: &[NormalizedRecord]) -> Result<(), SinkError>
where
    S: TimeSeriesSink + ?Sized,
{
    if records.is_empty() {
        return Ok(());
    }

    match sink.write_batch(records).await {
        Ok(()) => {
            tracing::debug!("Wrote {} records", records.len());
            Ok(())
        }
        Err(SinkError::MissingStorage(reason)) => {
            tracing::warn!("Time-series storage missing ({reason}), creating it");
            sink.create_storage().await?;
            tracing::info!("Time-series storage created, retrying write");
            sink.write_batch(records).await
        }
        Err(e) => Err(e),
    }
}
