use std::sync::Arc;
use tera::Context;
use tracing::warn;

use super::{send_all, Delivery, GuardedMailer, MailError, MailerGuard, OutgoingMail};
use crate::db::{CommitteeMember, CommitteeMemberSnapshot, Submission};
use crate::templates::get_tera;

#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    pub name: String,
    pub email: String,
}

impl From<&CommitteeMember> for Recipient {
    fn from(member: &CommitteeMember) -> Self {
        Self {
            name: member.name.clone(),
            email: member.email.clone(),
        }
    }
}

impl From<&CommitteeMemberSnapshot> for Recipient {
    fn from(snapshot: &CommitteeMemberSnapshot) -> Self {
        Self {
            name: snapshot.name.clone(),
            email: snapshot.email.clone(),
        }
    }
}

/// Turns review events into rendered mails and sends them through the guard.
pub struct Notifier {
    mailer: Arc<GuardedMailer>,
    conference: String,
    admin_email: Option<String>,
}

impl Notifier {
    pub fn new(
        mailer: Arc<GuardedMailer>,
        conference: String,
        admin_email: Option<String>,
    ) -> Self {
        Self {
            mailer,
            conference,
            admin_email,
        }
    }

    pub fn guard(&self) -> &MailerGuard {
        self.mailer.guard()
    }

    fn compose(
        &self,
        template: &str,
        to: &str,
        subject: String,
        ctx: &Context,
    ) -> Result<OutgoingMail, (String, MailError)> {
        get_tera()
            .render(template, ctx)
            .map(|html| OutgoingMail {
                to: to.to_string(),
                subject,
                html,
            })
            .map_err(|e| (to.to_string(), MailError::InvalidMessage(e.to_string())))
    }

    fn context(&self, submission: &Submission) -> Context {
        let mut ctx = Context::new();
        ctx.insert("conference", &self.conference);
        ctx.insert("submission", submission);
        ctx
    }

    async fn deliver(
        &self,
        kind: &'static str,
        submission: &Submission,
        composed: Vec<Result<OutgoingMail, (String, MailError)>>,
    ) -> Vec<Delivery> {
        let mut ready = Vec::new();
        let mut broken = Vec::new();
        for mail in composed {
            match mail {
                Ok(mail) => ready.push(mail),
                Err((to, err)) => broken.push(Delivery {
                    to,
                    result: Err(err),
                }),
            }
        }

        let mut deliveries = send_all(&self.mailer, ready).await;
        deliveries.extend(broken);

        for delivery in &deliveries {
            if let Err(err) = &delivery.result {
                warn!(
                    kind,
                    paper_id = %submission.label(),
                    to = %delivery.to,
                    error = %err,
                    "Email delivery failed"
                );
            }
        }
        deliveries
    }

    /// Confirmation to the submitter plus a notice to the admin inbox.
    pub async fn submission_received(&self, submission: &Submission) -> Vec<Delivery> {
        let ctx = self.context(submission);
        let mut composed = vec![self.compose(
            "submission_received.html",
            &submission.email,
            format!("{} | Paper Submission Confirmation", self.conference),
            &ctx,
        )];
        if let Some(admin) = &self.admin_email {
            composed.push(self.compose(
                "admin_new_submission.html",
                admin,
                format!(
                    "New Paper Submission {}: {}",
                    submission.label(),
                    submission.name
                ),
                &ctx,
            ));
        }
        self.deliver("submission_received", submission, composed)
            .await
    }

    pub async fn review_requests(
        &self,
        submission: &Submission,
        recipients: &[Recipient],
    ) -> Vec<Delivery> {
        let composed = recipients
            .iter()
            .map(|r| {
                let mut ctx = self.context(submission);
                ctx.insert("reviewer_name", &r.name);
                self.compose(
                    "review_request.html",
                    &r.email,
                    format!(
                        "{} | Paper Review Request: {}",
                        self.conference,
                        submission.label()
                    ),
                    &ctx,
                )
            })
            .collect();
        self.deliver("review_request", submission, composed).await
    }

    pub async fn review_reminders(
        &self,
        submission: &Submission,
        recipients: &[Recipient],
        reminder_number: i32,
    ) -> Vec<Delivery> {
        let composed = recipients
            .iter()
            .map(|r| {
                let mut ctx = self.context(submission);
                ctx.insert("reviewer_name", &r.name);
                ctx.insert("reminder_number", &reminder_number);
                self.compose(
                    "review_reminder.html",
                    &r.email,
                    format!(
                        "{} | Reminder: Review Pending for {}",
                        self.conference,
                        submission.label()
                    ),
                    &ctx,
                )
            })
            .collect();
        self.deliver("review_reminder", submission, composed).await
    }
}
