use crate::signal::{CandidateTx, DriftCandidate, SignalKind};
use chrono::Utc;
use helmsman_services::DriftCause;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Navigation/context change reported by the session host: a URL or an
/// active-application identifier.
#[derive(Debug, Clone)]
pub struct ContextChange {
    pub location: String,
}

/// How a location classified against the rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextClass {
    Blacklisted,
    TaskRelevant,
    Productivity,
    Irrelevant,
}

/// Substring rule set for context classification.
///
/// Priority: blacklist > task relevance > general productivity allow-list >
/// irrelevant, all matched case-insensitively by domain/substring.
#[derive(Debug, Clone)]
pub struct ContextRules {
    blacklist: Vec<String>,
    task_relevant: Vec<String>,
    productivity: Vec<String>,
}

/// Built-in blacklist: entertainment, social media, shopping, news.
const DEFAULT_BLACKLIST: &[&str] = &[
    // Entertainment
    "youtube.",
    "netflix.",
    "twitch.",
    "hulu.",
    "disneyplus.",
    "spotify.",
    // Social media
    "facebook.",
    "twitter.",
    "x.com",
    "instagram.",
    "tiktok.",
    "reddit.",
    "snapchat.",
    "pinterest.",
    // Shopping
    "amazon.",
    "ebay.",
    "etsy.",
    "aliexpress.",
    // News
    "cnn.",
    "bbc.",
    "nytimes.",
    "foxnews.",
    "news.google.",
];

/// Built-in general productivity allow-list.
const DEFAULT_PRODUCTIVITY: &[&str] = &[
    "github.",
    "gitlab.",
    "stackoverflow.",
    "docs.google.",
    "notion.",
    "linear.app",
    "figma.",
    "localhost",
    "wikipedia.",
];

impl ContextRules {
    /// Build the rule set for one session: built-in lists plus config
    /// extensions plus the session's task-relevant contexts.
    #[must_use]
    pub fn new(
        task_relevant: Vec<String>,
        extra_blacklist: &[String],
        extra_productivity: &[String],
    ) -> Self {
        let mut blacklist: Vec<String> =
            DEFAULT_BLACKLIST.iter().map(|s| (*s).to_lowercase()).collect();
        blacklist.extend(extra_blacklist.iter().map(|s| s.to_lowercase()));

        let mut productivity: Vec<String> =
            DEFAULT_PRODUCTIVITY.iter().map(|s| (*s).to_lowercase()).collect();
        productivity.extend(extra_productivity.iter().map(|s| s.to_lowercase()));

        Self {
            blacklist,
            task_relevant: task_relevant.iter().map(|s| s.to_lowercase()).collect(),
            productivity,
        }
    }

    fn classify(&self, location: &str) -> ContextClass {
        let location = location.to_lowercase();
        if self.blacklist.iter().any(|p| location.contains(p.as_str())) {
            ContextClass::Blacklisted
        } else if self
            .task_relevant
            .iter()
            .any(|p| location.contains(p.as_str()))
        {
            ContextClass::TaskRelevant
        } else if self
            .productivity
            .iter()
            .any(|p| location.contains(p.as_str()))
        {
            ContextClass::Productivity
        } else {
            ContextClass::Irrelevant
        }
    }
}

/// Watches navigation/context changes and classifies each new location.
///
/// A blacklist hit raises `blacklisted_content` immediately; an unmatched
/// location raises `irrelevant_context`; landing back on task-relevant or
/// productivity context while distracted emits the restore. Repeat
/// classifications of the same class do not re-emit.
pub struct ContextWatcher {
    rules: ContextRules,
    tx: CandidateTx,
}

impl ContextWatcher {
    #[must_use]
    pub fn new(rules: ContextRules, tx: CandidateTx) -> Self {
        Self { rules, tx }
    }

    pub async fn run(
        self,
        mut changes: tokio::sync::mpsc::Receiver<ContextChange>,
        cancel: CancellationToken,
    ) {
        // Active drift raised by this source, if any.
        let mut raised: Option<(DriftCause, Instant)> = None;

        loop {
            let change = tokio::select! {
                () = cancel.cancelled() => break,
                change = changes.recv() => match change {
                    None => break,
                    Some(change) => change,
                },
            };

            let class = self.rules.classify(&change.location);
            log::debug!("context '{}' classified as {class:?}", change.location);

            let candidate = match class {
                ContextClass::Blacklisted => {
                    Self::raise(&mut raised, DriftCause::BlacklistedContent, 1.0)
                }
                ContextClass::Irrelevant => {
                    Self::raise(&mut raised, DriftCause::IrrelevantContext, 0.7)
                }
                ContextClass::TaskRelevant | ContextClass::Productivity => raised
                    .take()
                    .map(|(_, since)| {
                        DriftCandidate::restored(SignalKind::Context, Some(since.elapsed()))
                    }),
            };

            if let Some(candidate) = candidate {
                if self.tx.send(candidate).await.is_err() {
                    break;
                }
            }
        }
        log::debug!("context watcher stopped");
    }

    fn raise(
        raised: &mut Option<(DriftCause, Instant)>,
        cause: DriftCause,
        confidence: f32,
    ) -> Option<DriftCandidate> {
        match raised {
            // Same cause already active: keep the original start, no re-emit.
            Some((active, _)) if *active == cause => None,
            _ => {
                if raised.is_none() {
                    *raised = Some((cause, Instant::now()));
                } else if let Some(entry) = raised.as_mut() {
                    // Cause changed mid-drift; keep the original start time.
                    entry.0 = cause;
                }
                Some(DriftCandidate::drift(
                    SignalKind::Context,
                    cause,
                    Utc::now(),
                    confidence,
                ))
            }
        }
    }
}
