//! Pipeline counters
//!
//! Emitted through the `metrics` facade; without an installed recorder every
//! call is a no-op.
//!
//! - `api_requests_total` (counter): label `outcome` (`success` or an error kind)
//! - `auth_refresh_total` (counter): label `outcome`
//! - `auth_replays_total` (counter)

use crate::error::{ApiError, RefreshFailure};

/// Record a finished dispatcher call.
pub fn record_request<T>(result: &Result<T, ApiError>) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.kind().label(),
    };
    metrics::counter!("api_requests_total", "outcome" => outcome).increment(1);
}

/// Record one settled refresh cycle. Waiters are not counted.
pub fn record_refresh(failure: Option<&RefreshFailure>) {
    let outcome = failure.map_or("success", RefreshFailure::label);
    metrics::counter!("auth_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_replay() {
    metrics::counter!("auth_replays_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_request::<()>(&Ok(()));
        record_refresh(Some(&RefreshFailure::Abandoned));
        record_replay();
    }

    #[test]
    fn request_outcomes_are_labelled_by_kind() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request::<()>(&Ok(()));
        record_request::<()>(&Err(ApiError::NotFound("gone".into())));
        record_request::<()>(&Err(RefreshFailure::NoRefreshToken.into()));

        let output = handle.render();
        assert!(output.contains("api_requests_total"));
        assert!(output.contains("outcome=\"success\""));
        assert!(output.contains("outcome=\"not_found\""));
        assert!(output.contains("outcome=\"auth_expired\""));
    }

    #[test]
    fn refresh_and_replay_counters_render() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_refresh(None);
        record_refresh(Some(&RefreshFailure::Rejected("401".into())));
        record_replay();

        let output = handle.render();
        assert!(output.contains("auth_refresh_total{outcome=\"success\"} 1"));
        assert!(output.contains("auth_refresh_total{outcome=\"rejected\"} 1"));
        assert!(output.contains("auth_replays_total 1"));
    }
}
