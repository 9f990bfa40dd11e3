//! services/podcast/src/interrupt.rs
//!
//! Interrupt handling for the batch binary: the first interrupt cancels the
//! run and lets open connections finish, a second one asks for an immediate exit.

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// What the second interrupt should lead to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// A second interrupt arrived while cleanup was still running.
    ExitNow,
    /// The interrupt source ended before a second interrupt.
    Exhausted,
}

/// Cancels `token` on the first item from `interrupts` and reports whether a second one follows.
pub async fn escalate<S>(interrupts: S, token: CancellationToken) -> Escalation
where
    S: Stream<Item = ()>,
{
    let mut interrupts = std::pin::pin!(interrupts);

    if interrupts.next().await.is_none() {
        return Escalation::Exhausted;
    }
    warn!("Interrupt received; finishing open connections (interrupt again to exit now)");
    token.cancel();

    match interrupts.next().await {
        Some(()) => {
            warn!("Second interrupt received; exiting without waiting for cleanup");
            Escalation::ExitNow
        }
        None => Escalation::Exhausted,
    }
}

/// Ctrl-C presses as a stream. Ends if the signal handler cannot be installed.
pub fn ctrl_c() -> impl Stream<Item = ()> {
    futures::stream::unfold((), |()| async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Some(((), ())),
            Err(e) => {
                warn!(error = %e, "Could not listen for Ctrl-C");
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[tokio::test]
    async fn first_interrupt_cancels_second_exits() {
        let token = CancellationToken::new();
        let outcome = escalate(stream::iter([(), ()]), token.clone()).await;

        assert_eq!(outcome, Escalation::ExitNow);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn single_interrupt_only_cancels() {
        let token = CancellationToken::new();
        let outcome = escalate(stream::iter([()]), token.clone()).await;

        assert_eq!(outcome, Escalation::Exhausted);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn no_interrupt_leaves_the_run_alone() {
        let token = CancellationToken::new();
        let outcome = escalate(stream::empty(), token.clone()).await;

        assert_eq!(outcome, Escalation::Exhausted);
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn waits_for_the_second_interrupt() {
        let token = CancellationToken::new();
        let pending = escalate(stream::iter([()]).chain(stream::pending()), token.clone());

        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(20), pending).await;
        assert!(timed_out.is_err());
        assert!(token.is_cancelled());
    }
}
