use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

use super::status::Status;
use crate::fetch::FetchError;
use crate::target::Target;

/// Map a fetch outcome to a status. Never fails: fetch errors, predicate
/// errors and predicate panics all become [`Status::Error`].
pub fn evaluate(target: &Target, outcome: &Result<String, FetchError>) -> Status {
    let content = match outcome {
        Ok(content) => content,
        Err(e) => {
            warn!(target_id = %target.id, url = %target.url, error = %e, "Fetch failed");
            return Status::Error;
        }
    };

    match panic::catch_unwind(AssertUnwindSafe(|| target.predicate.evaluate(content))) {
        Ok(Ok(true)) => Status::Available,
        Ok(Ok(false)) => Status::NotAvailable,
        Ok(Err(e)) => {
            warn!(target_id = %target.id, url = %target.url, error = %e, "Predicate failed");
            Status::Error
        }
        Err(_) => {
            warn!(target_id = %target.id, url = %target.url, "Predicate panicked");
            Status::Error
        }
    }
}
