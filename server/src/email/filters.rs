use super::candidate::CandidateEmail;

// Markers that newsletters carry somewhere in their text. Mail without any of
// them is assumed transactional or personal and skipped before the gateway
// ever sees it.
const UNSUBSCRIBE_KEYWORDS: &[&str] = &[
    "unsubscribe",
    "opt out",
    "opt-out",
    "remove me",
    "stop emails",
    "manage preferences",
    "email preferences",
    "subscription preferences",
];

// Obvious transactional/system mail. Deliberately conservative: the gateway
// prompt makes the real newsletter-or-not call, this list only drops the
// unambiguous cases.
const SKIP_KEYWORDS: &[&str] = &[
    "verification code",
    "confirm your",
    "reset your password",
    "your account has been",
    "account verification",
    "please verify",
    "confirm your email",
    "activate your account",
    "password reset",
    "login attempt",
    "security alert",
    "suspicious activity",
    "invoice #",
    "receipt #",
    "payment confirmation",
    "order confirmation",
    "shipment",
    "delivery notification",
    "transaction completed",
    "payment failed",
    "card declined",
];

/// Cheap heuristic pass over the fetched window. Keeps candidates only;
/// everything else is discarded before batching.
pub fn newsletter_candidates(emails: Vec<CandidateEmail>) -> Vec<CandidateEmail> {
    let total = emails.len();
    let kept: Vec<CandidateEmail> = emails.into_iter().filter(should_keep).collect();
    tracing::info!("Primitive filtering: {} -> {} candidates", total, kept.len());

    kept
}

fn should_keep(email: &CandidateEmail) -> bool {
    if email.sender.trim().is_empty() || email.subject.trim().is_empty() {
        return false;
    }

    let subject = email.subject.to_lowercase();
    let sender = email.sender.to_lowercase();
    let body = email.body.to_lowercase();

    let has_unsubscribe_marker = UNSUBSCRIBE_KEYWORDS
        .iter()
        .any(|kw| subject.contains(kw) || sender.contains(kw) || body.contains(kw));
    if !has_unsubscribe_marker {
        return false;
    }

    !SKIP_KEYWORDS
        .iter()
        .any(|kw| subject.contains(kw) || body.contains(kw))
}
