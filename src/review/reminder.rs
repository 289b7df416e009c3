use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::config::ReminderConfig;
use crate::db::{Store, StoreError, Submission, SubmissionFilter};
use crate::mail::{FanOutReport, Notifier, Recipient};

/// When the reminder clock for a submission last started.
pub fn reference_time(submission: &Submission) -> DateTime<Utc> {
    if let Some(last) = submission.review_reminder_last_sent_at {
        return last;
    }
    submission
        .committee_members
        .iter()
        .map(|m| m.sent_at)
        .min()
        .unwrap_or(submission.updated_at)
}

fn interval_of(config: &ReminderConfig) -> Duration {
    Duration::milliseconds((config.interval_hours * 3_600_000.0).round() as i64)
}

pub fn is_due(submission: &Submission, now: DateTime<Utc>, config: &ReminderConfig) -> bool {
    if submission.review_reminder_count >= config.max_reminders {
        return false;
    }
    if submission.review_status.is_terminal() || !submission.sent_to_committee {
        return false;
    }
    now - reference_time(submission) >= interval_of(config)
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub scanned: usize,
    pub reminders_sent: usize,
    /// Set when the tick was skipped, or cut short, by the mailer cooldown.
    pub blocked_until: Option<DateTime<Utc>>,
}

/// One scan over everything awaiting a decision.
pub async fn run_tick(
    store: &dyn Store,
    notifier: &Notifier,
    clock: &dyn Clock,
    config: &ReminderConfig,
) -> Result<TickReport, StoreError> {
    let guard = notifier.guard();
    if guard.is_blocked() {
        let until = guard.next_available();
        warn!(until = %until.to_rfc3339(), "Mailer cooling down, skipping reminder tick");
        return Ok(TickReport {
            blocked_until: Some(until),
            ..Default::default()
        });
    }

    let pending = store
        .find_submissions(&SubmissionFilter::awaiting_decision())
        .await?;
    let mut report = TickReport {
        scanned: pending.len(),
        ..Default::default()
    };

    for submission in pending {
        let now = clock.now();
        if !is_due(&submission, now, config) {
            continue;
        }
        if submission.committee_members.is_empty() {
            warn!(
                paper_id = %submission.label(),
                "Sent to committee but no members recorded, skipping"
            );
            continue;
        }

        let reminder_number = submission.review_reminder_count + 1;
        let recipients: Vec<Recipient> = submission
            .committee_members
            .iter()
            .map(Recipient::from)
            .collect();
        let deliveries = notifier
            .review_reminders(&submission, &recipients, reminder_number)
            .await;
        let delivery = FanOutReport::from_deliveries(&deliveries);

        // A cooldown tripped mid-fan-out: stop here, this one goes again next time.
        if delivery.delivered == 0 {
            if let Some(until) = guard.blocked_until() {
                warn!(
                    paper_id = %submission.label(),
                    until = %until.to_rfc3339(),
                    "Mailer cooling down, ending reminder tick early"
                );
                report.blocked_until = Some(until);
                break;
            }
        }

        match store
            .record_reminder_sent(submission.id, clock.now(), config.max_reminders)
            .await?
        {
            Some(updated) => {
                report.reminders_sent += 1;
                info!(
                    paper_id = %updated.label(),
                    reminder = updated.review_reminder_count,
                    delivered = delivery.delivered,
                    failed = delivery.failed,
                    "Review reminder sent"
                );
            }
            None => info!(
                paper_id = %submission.label(),
                "Submission left the reminder queue during the tick"
            ),
        }
    }

    info!(
        scanned = report.scanned,
        reminders_sent = report.reminders_sent,
        "Reminder tick finished"
    );
    Ok(report)
}

/// Starts the reminder loop in the background, or returns `None` when
/// reminders are switched off.
pub fn spawn_reminder_job(
    store: Arc<dyn Store>,
    notifier: Arc<Notifier>,
    clock: Arc<dyn Clock>,
    config: ReminderConfig,
) -> Option<JoinHandle<()>> {
    if config.disabled {
        info!("Review reminders disabled");
        return None;
    }

    info!(
        interval_hours = config.interval_hours,
        check_every_minutes = config.check_every_minutes,
        max_reminders = config.max_reminders,
        "Starting review reminder job"
    );

    Some(tokio::spawn(async move {
        sleep(config.initial_delay).await;
        let period = std::time::Duration::from_secs(config.check_every_minutes.max(1) * 60);

        loop {
            if let Err(e) = run_tick(store.as_ref(), &notifier, clock.as_ref(), &config).await {
                error!("Reminder tick failed: {}", e);
            }
            sleep(period).await;
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::{CommitteeMemberSnapshot, InMemoryStore, SubmissionPatch};
    use crate::mail::testing::RecordingMailer;
    use crate::mail::MailError;
    use crate::review::intake::tests::{notifier, sample_submission};
    use crate::review::status::{update_review_status, ReviewStatus};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn config() -> ReminderConfig {
        ReminderConfig {
            interval_hours: 24.0,
            check_every_minutes: 60,
            max_reminders: 3,
            disabled: false,
            initial_delay: std::time::Duration::ZERO,
        }
    }

    struct Fixture {
        store: InMemoryStore,
        clock: Arc<ManualClock>,
        mailer: Arc<RecordingMailer>,
        notifier: Notifier,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::at(
                Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
            ));
            let mailer = Arc::new(RecordingMailer::new());
            Self {
                store: InMemoryStore::new(),
                notifier: notifier(clock.clone(), mailer.clone()),
                clock,
                mailer,
            }
        }

        async fn dispatched(&self, email: &str, paper_id: &str) -> Submission {
            let now = self.clock.now();
            let created = self
                .store
                .create_submission(&sample_submission(email), paper_id, now)
                .await
                .unwrap();
            let snapshot = vec![
                CommitteeMemberSnapshot {
                    id: Uuid::new_v4(),
                    name: "Alan".to_string(),
                    email: "alan@example.org".to_string(),
                    sent_at: now,
                },
                CommitteeMemberSnapshot {
                    id: Uuid::new_v4(),
                    name: "Barbara".to_string(),
                    email: "barbara@example.org".to_string(),
                    sent_at: now,
                },
            ];
            self.store
                .update_submission(
                    created.id,
                    SubmissionPatch {
                        review_status: Some(ReviewStatus::SentToCommittee),
                        sent_to_committee: Some(true),
                        committee_members: Some(Some(snapshot)),
                        ..Default::default()
                    },
                    now,
                )
                .await
                .unwrap()
        }

        async fn tick(&self) -> TickReport {
            run_tick(&self.store, &self.notifier, self.clock.as_ref(), &config())
                .await
                .unwrap()
        }

        async fn reload(&self, id: Uuid) -> Submission {
            self.store.get_submission(id).await.unwrap().unwrap()
        }
    }

    #[tokio::test]
    async fn nothing_is_due_before_the_interval() {
        let f = Fixture::new();
        f.dispatched("a@example.org", "2503001").await;
        f.clock.advance(Duration::hours(23));

        let report = f.tick().await;
        assert_eq!(report.scanned, 1);
        assert_eq!(report.reminders_sent, 0);
        assert!(f.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn due_submission_reminds_every_snapshot_member() {
        let f = Fixture::new();
        let s = f.dispatched("a@example.org", "2503001").await;
        f.clock.advance(Duration::hours(24));

        let report = f.tick().await;
        assert_eq!(report.reminders_sent, 1);
        assert_eq!(f.mailer.sent_to("alan@example.org"), 1);
        assert_eq!(f.mailer.sent_to("barbara@example.org"), 1);

        let updated = f.reload(s.id).await;
        assert_eq!(updated.review_reminder_count, 1);
        assert_eq!(updated.review_reminder_last_sent_at, Some(f.clock.now()));
    }

    #[tokio::test]
    async fn partial_delivery_still_counts_the_reminder() {
        let f = Fixture::new();
        let s = f.dispatched("a@example.org", "2503001").await;
        f.mailer.fail_for(
            "barbara@example.org",
            MailError::Rejected {
                code: 550,
                message: "mailbox unavailable".to_string(),
            },
        );
        f.clock.advance(Duration::hours(25));

        assert_eq!(f.tick().await.reminders_sent, 1);
        assert_eq!(f.reload(s.id).await.review_reminder_count, 1);
    }

    #[tokio::test]
    async fn eligibility_is_monotonic_in_time() {
        let f = Fixture::new();
        let s = f.dispatched("a@example.org", "2503001").await;
        let reference = reference_time(&s);
        let cfg = config();

        assert!(!is_due(&s, reference + Duration::hours(23), &cfg));
        for extra in [0, 1, 5, 240] {
            assert!(is_due(&s, reference + Duration::hours(24 + extra), &cfg));
        }
    }

    #[test]
    fn fractional_interval_hours_are_honoured() {
        let mut cfg = config();
        cfg.interval_hours = 0.5;
        assert_eq!(interval_of(&cfg), Duration::minutes(30));
    }

    #[tokio::test]
    async fn reference_falls_back_to_earliest_snapshot() {
        let f = Fixture::new();
        let mut s = f.dispatched("a@example.org", "2503001").await;
        let earliest = f.clock.now() - Duration::hours(6);
        s.committee_members[1].sent_at = earliest;
        s.updated_at = f.clock.now() + Duration::hours(1);
        assert_eq!(reference_time(&s), earliest);

        s.review_reminder_last_sent_at = Some(f.clock.now());
        assert_eq!(reference_time(&s), f.clock.now());

        s.review_reminder_last_sent_at = None;
        s.committee_members.clear();
        assert_eq!(reference_time(&s), s.updated_at);
    }

    #[tokio::test]
    async fn reminder_count_never_exceeds_the_cap() {
        let f = Fixture::new();
        let s = f.dispatched("a@example.org", "2503001").await;

        for _ in 0..10 {
            f.clock.advance(Duration::hours(24));
            f.tick().await;
        }

        let updated = f.reload(s.id).await;
        assert_eq!(updated.review_reminder_count, config().max_reminders);
        assert_eq!(f.mailer.sent_to("alan@example.org"), 3);
    }

    #[tokio::test]
    async fn restarted_review_cycle_reminds_again() {
        let f = Fixture::new();
        let s = f.dispatched("a@example.org", "2503001").await;
        for _ in 0..3 {
            f.clock.advance(Duration::hours(24));
            f.tick().await;
        }
        assert_eq!(f.reload(s.id).await.review_reminder_count, 3);

        update_review_status(&f.store, f.clock.as_ref(), s.id, "PENDING")
            .await
            .unwrap();
        f.clock.advance(Duration::days(10));
        let snapshot = vec![CommitteeMemberSnapshot {
            id: Uuid::new_v4(),
            name: "Alan".to_string(),
            email: "alan@example.org".to_string(),
            sent_at: f.clock.now(),
        }];
        f.store
            .update_submission(
                s.id,
                SubmissionPatch {
                    review_status: Some(ReviewStatus::SentToCommittee),
                    sent_to_committee: Some(true),
                    committee_members: Some(Some(snapshot)),
                    ..Default::default()
                },
                f.clock.now(),
            )
            .await
            .unwrap();

        f.clock.advance(Duration::hours(24));
        assert_eq!(f.tick().await.reminders_sent, 1);
        assert_eq!(f.reload(s.id).await.review_reminder_count, 1);
    }

    #[tokio::test]
    async fn terminal_submissions_are_left_alone() {
        let f = Fixture::new();
        let mut ids = Vec::new();
        for (i, status) in [
            ReviewStatus::Approved,
            ReviewStatus::Rejected,
            ReviewStatus::NeedsRevision,
        ]
        .into_iter()
        .enumerate()
        {
            let s = f
                .dispatched(&format!("t{i}@example.org"), &format!("250300{}", i + 1))
                .await;
            f.store
                .update_submission(
                    s.id,
                    SubmissionPatch {
                        review_status: Some(status),
                        ..Default::default()
                    },
                    f.clock.now(),
                )
                .await
                .unwrap();
            ids.push(s.id);
        }

        for _ in 0..3 {
            f.clock.advance(Duration::hours(48));
            let report = f.tick().await;
            assert_eq!(report.scanned, 0);
        }

        for id in ids {
            let s = f.reload(id).await;
            assert_eq!(s.review_reminder_count, 0);
            assert_eq!(s.review_reminder_last_sent_at, None);
        }
        assert!(f.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn blocked_mailer_skips_the_whole_tick() {
        let f = Fixture::new();
        let s = f.dispatched("a@example.org", "2503001").await;
        f.clock.advance(Duration::hours(30));
        f.notifier.guard().trip();

        let report = f.tick().await;
        assert_eq!(report.scanned, 0);
        assert_eq!(report.reminders_sent, 0);
        assert!(report.blocked_until.is_some());
        assert_eq!(f.mailer.attempts(), 0);
        assert_eq!(f.reload(s.id).await.review_reminder_count, 0);
    }

    #[tokio::test]
    async fn quota_error_mid_tick_stops_without_counting() {
        let f = Fixture::new();
        let s = f.dispatched("a@example.org", "2503001").await;
        for to in ["alan@example.org", "barbara@example.org"] {
            f.mailer.fail_for(
                to,
                MailError::RateLimited {
                    code: 550,
                    message: "5.4.5 Daily user sending quota exceeded".to_string(),
                },
            );
        }
        f.clock.advance(Duration::hours(24));

        let report = f.tick().await;
        assert_eq!(report.reminders_sent, 0);
        assert!(report.blocked_until.is_some());
        assert!(f.notifier.guard().is_blocked());
        assert_eq!(f.reload(s.id).await.review_reminder_count, 0);
    }

    #[tokio::test]
    async fn submissions_without_a_snapshot_are_skipped() {
        let f = Fixture::new();
        let s = f.dispatched("a@example.org", "2503001").await;
        f.store
            .update_submission(
                s.id,
                SubmissionPatch {
                    committee_members: Some(None),
                    ..Default::default()
                },
                f.clock.now(),
            )
            .await
            .unwrap();
        f.clock.advance(Duration::hours(48));

        assert_eq!(f.tick().await.reminders_sent, 0);
        assert_eq!(f.reload(s.id).await.review_reminder_count, 0);
    }

    #[tokio::test]
    async fn disabled_job_is_not_spawned() {
        let f = Fixture::new();
        let mut cfg = config();
        cfg.disabled = true;
        let handle = spawn_reminder_job(
            Arc::new(InMemoryStore::new()),
            Arc::new(f.notifier),
            f.clock,
            cfg,
        );
        assert!(handle.is_none());
    }
}
