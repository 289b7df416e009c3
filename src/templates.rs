use std::sync::OnceLock;
use tera::Tera;

static TERA: OnceLock<Tera> = OnceLock::new();

const EMAIL_TEMPLATES: [(&str, &str); 4] = [
    (
        "submission_received.html",
        include_str!("../templates/email/submission_received.html"),
    ),
    (
        "admin_new_submission.html",
        include_str!("../templates/email/admin_new_submission.html"),
    ),
    (
        "review_request.html",
        include_str!("../templates/email/review_request.html"),
    ),
    (
        "review_reminder.html",
        include_str!("../templates/email/review_reminder.html"),
    ),
];

pub fn get_tera() -> &'static Tera {
    TERA.get_or_init(|| {
        let mut tera = Tera::default();
        tera.add_raw_templates(EMAIL_TEMPLATES)
            .expect("Failed to load email templates");
        tera
    })
}
