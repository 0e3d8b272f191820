use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, instrument, warn};
use waypost_core::config::CoordinatePolicy;
use waypost_core::LocationSample;
use waypost_fanout::Broadcaster;
use waypost_history::HistoryStore;

use crate::error::Result;
use crate::validate;

/// Accepts location reports: validate, record in history, publish live.
///
/// A rejected report touches neither the store nor the subscriber set.
pub struct IngestService {
    store: Arc<HistoryStore>,
    broadcaster: Arc<Broadcaster>,
    policy: CoordinatePolicy,
    /// Held across append + publish so history order matches broadcast order.
    order: Mutex<()>,
}

impl IngestService {
    pub fn new(
        store: Arc<HistoryStore>,
        broadcaster: Arc<Broadcaster>,
        policy: CoordinatePolicy,
    ) -> Self {
        Self {
            store,
            broadcaster,
            policy,
            order: Mutex::new(()),
        }
    }

    /// Accept a raw JSON report body.
    pub fn accept(&self, body: &[u8]) -> Result<Arc<LocationSample>> {
        self.accept_dated(body, None)
    }

    /// Accept a raw JSON report body, using `date` as the sample time when
    /// the report has none of its own.
    #[instrument(level = "debug", skip_all, fields(bytes = body.len()))]
    pub fn accept_dated(&self, body: &[u8], date: Option<&str>) -> Result<Arc<LocationSample>> {
        let sample = validate::parse(body)
            .and_then(|report| validate::normalize(report, self.policy, date))
            .inspect_err(|e| warn!(code = e.code(), error = %e, "report rejected"))?;

        Ok(self.record(sample))
    }

    /// Store and publish an already-validated sample.
    pub fn record(&self, sample: LocationSample) -> Arc<LocationSample> {
        let sample = Arc::new(sample);

        let order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.append(&sample.identity, Arc::clone(&sample));
        let report = self.broadcaster.publish(Arc::clone(&sample));
        drop(order);

        info!(
            identity = %sample.identity,
            seq = report.seq,
            delivered = report.delivered,
            evicted = report.evicted,
            "location accepted"
        );
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use waypost_core::Identity;
    use waypost_fanout::{Delivery, SubscriptionHandle};

    struct Fixture {
        store: Arc<HistoryStore>,
        broadcaster: Arc<Broadcaster>,
        ingest: IngestService,
    }

    fn fixture(policy: CoordinatePolicy) -> Fixture {
        let store = Arc::new(HistoryStore::with_retention(1000));
        let broadcaster = Arc::new(Broadcaster::new(1000));
        let ingest = IngestService::new(Arc::clone(&store), Arc::clone(&broadcaster), policy);
        Fixture {
            store,
            broadcaster,
            ingest,
        }
    }

    fn drain(handle: &mut SubscriptionHandle) -> Vec<Delivery> {
        std::iter::from_fn(|| handle.try_recv()).collect()
    }

    #[test]
    fn accepted_report_is_stored_then_published() {
        let f = fixture(CoordinatePolicy::Reject);
        let mut viewer = f.broadcaster.subscribe();

        let body = br#"{
            "identity": "A", "token": "secret", "lat": 10, "lon": 20,
            "ip": "1.2.3.4", "when": "t1"
        }"#;
        let sample = f.ingest.accept(body).unwrap();

        assert_eq!(sample.identity.as_str(), "A");
        assert_eq!(sample.token.as_deref(), Some("secret"));
        assert_eq!(f.store.get(&Identity::from("A")), vec![Arc::clone(&sample)]);

        let got = drain(&mut viewer);
        assert_eq!(got.len(), 1);
        assert!(Arc::ptr_eq(&got[0].sample, &sample));
    }

    #[test]
    fn original_phone_field_is_accepted() {
        let f = fixture(CoordinatePolicy::Reject);
        let sample = f.ingest.accept(br#"{"phone":"kali-device","lat":1.5,"lon":2.5}"#).unwrap();
        assert_eq!(sample.identity.as_str(), "kali-device");
        assert_eq!(f.store.len(&Identity::from("kali-device")), 1);
    }

    #[test]
    fn rejections_leave_store_and_subscribers_untouched() {
        let f = fixture(CoordinatePolicy::Reject);
        let mut viewer = f.broadcaster.subscribe();

        let err = f.ingest.accept(br#"{"identity":"","lat":1,"lon":1}"#).unwrap_err();
        assert_eq!(err, IngestError::InvalidIdentity);

        let err = f.ingest.accept(b"definitely not json").unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput { .. }));

        let err = f.ingest.accept(br#"{"identity":"A","lat":-95,"lon":1}"#).unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput { .. }));

        assert_eq!(f.store.identity_count(), 0);
        assert_eq!(f.broadcaster.subscriber_count(), 1);
        assert!(drain(&mut viewer).is_empty());

        // ingest keeps serving after rejections
        assert!(f.ingest.accept(br#"{"identity":"A","lat":1,"lon":1}"#).is_ok());
        assert_eq!(drain(&mut viewer).len(), 1);
    }

    #[test]
    fn flag_policy_stores_out_of_range_samples() {
        let f = fixture(CoordinatePolicy::Flag);
        let sample = f.ingest.accept(br#"{"identity":"A","lat":120,"lon":1}"#).unwrap();
        assert!(sample.out_of_range);
        assert_eq!(f.store.len(&Identity::from("A")), 1);
    }

    #[test]
    fn date_fallback_is_applied() {
        let f = fixture(CoordinatePolicy::Reject);
        let sample = f
            .ingest
            .accept_dated(
                br#"{"identity":"A","lat":1,"lon":1}"#,
                Some("Wed, 01 May 2024 12:00:00 GMT"),
            )
            .unwrap();
        assert_eq!(sample.when, "Wed, 01 May 2024 12:00:00 GMT");
    }

    #[test]
    fn concurrent_ingest_keeps_history_and_broadcast_in_the_same_order() {
        let f = fixture(CoordinatePolicy::Reject);
        let mut viewer = f.broadcaster.subscribe();

        std::thread::scope(|s| {
            for w in 0..8 {
                let ingest = &f.ingest;
                s.spawn(move || {
                    for n in 0..50 {
                        let body =
                            format!(r#"{{"identity":"A","lat":1,"lon":1,"when":"w{w}-{n}"}}"#);
                        ingest.accept(body.as_bytes()).unwrap();
                    }
                });
            }
        });

        let history: Vec<String> = f
            .store
            .get(&Identity::from("A"))
            .iter()
            .map(|s| s.when.clone())
            .collect();
        let pushed: Vec<String> = drain(&mut viewer)
            .iter()
            .map(|d| d.sample.when.clone())
            .collect();

        assert_eq!(history.len(), 400);
        assert_eq!(history, pushed);
    }
}
