//! Moving stakes out of escrow: payouts, refunds and credit retries.

use serde::Serialize;
use tracing::{info, warn};

use crate::broadcast::{NoticeKind, Outbound, TableNotice};
use crate::error::LedgerError;
use crate::registry::Occupant;
use crate::result::RoundResult;
use crate::session::{AbortReason, Credit, RefundReport};

use super::{BlackjackTable, LOG_TARGET, Seat};

/// A credit the ledger has not accepted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingCredit {
    /// Ledger key.
    pub identity: String,
    /// Amount owed regardless of the profit cap.
    pub amount: u64,
    /// Profit that still has to pass the daily cap.
    pub uncapped_profit: u64,
}

impl PendingCredit {
    fn owed(&self) -> Credit {
        Credit {
            identity: self.identity.clone(),
            amount: self.amount + self.uncapped_profit,
        }
    }
}

struct Settled {
    amount: u64,
    capped: u64,
    balance: u64,
}

impl BlackjackTable {
    /// Applies the profit cap, then credits. On failure the returned credit
    /// records how far it got, so a retry never applies the cap twice.
    fn pay(&self, mut owed: PendingCredit) -> Result<Settled, (PendingCredit, LedgerError)> {
        let mut capped = 0;
        if owed.uncapped_profit > 0 {
            let profit = owed.uncapped_profit;
            let allowed = match self.ledger.balance(&owed.identity).and_then(|balance| {
                self.ledger
                    .apply_daily_profit_cap(&owed.identity, profit, balance)
            }) {
                Ok(allowed) => allowed,
                Err(err) => return Err((owed, err)),
            };
            owed.amount += allowed;
            owed.uncapped_profit = 0;
            capped = profit - allowed;
        }

        let credited = if owed.amount > 0 {
            self.ledger.credit(&owed.identity, owed.amount)
        } else {
            self.ledger.balance(&owed.identity)
        };
        match credited {
            Ok(balance) => Ok(Settled {
                amount: owed.amount,
                capped,
                balance,
            }),
            Err(err) => Err((owed, err)),
        }
    }

    /// Pays every seat of a resolved round.
    ///
    /// A winning seat gets its stake back plus the profit the daily cap
    /// allows; a push gets exactly its stake; a loss gets whatever is left of
    /// the stake. The owner is told only after the ledger accepted the
    /// credit; failed credits are queued.
    pub(super) fn settle_round(&mut self, result: &RoundResult) {
        for seat in &result.seats {
            let owed = PendingCredit {
                identity: seat.identity.clone(),
                amount: seat.gross_payout().min(seat.stake),
                uncapped_profit: u64::try_from(seat.delta).unwrap_or(0),
            };

            match self.pay(owed) {
                Ok(settled) => {
                    info!(
                        target: LOG_TARGET,
                        identity = %seat.identity,
                        delta = seat.delta,
                        amount = settled.amount,
                        capped = settled.capped,
                        "seat settled"
                    );
                    self.outbox.viewer(
                        &seat.identity,
                        Outbound::Payout {
                            amount: settled.amount,
                            delta: seat.delta,
                            capped: settled.capped,
                            balance: settled.balance,
                        },
                    );
                }
                Err((pending, err)) => {
                    warn!(target: LOG_TARGET, identity = %seat.identity, %err, "payout failed, queued for retry");
                    self.pending_credits.push(pending);
                }
            }

            if let Some(held) = self.registry.seat_mut(&seat.identity) {
                held.last_outcome = seat.delta;
            }
        }
        self.escrowed = 0;
    }

    /// Returns `amount` of escrowed stake to `identity`, uncapped. Returns the
    /// credit and whether the ledger accepted it, or `None` for a zero amount.
    pub(super) fn refund_stake(
        &mut self,
        identity: &str,
        amount: u64,
        reason: AbortReason,
    ) -> Option<(Credit, bool)> {
        if amount == 0 {
            return None;
        }
        self.escrowed = self.escrowed.saturating_sub(amount);
        let credit = Credit {
            identity: identity.to_owned(),
            amount,
        };

        let owed = PendingCredit {
            identity: identity.to_owned(),
            amount,
            uncapped_profit: 0,
        };
        match self.pay(owed) {
            Ok(settled) => {
                info!(target: LOG_TARGET, identity, amount, balance = settled.balance, ?reason, "stake refunded");
                self.outbox
                    .viewer(identity, Outbound::Refund { amount, reason });
                Some((credit, true))
            }
            Err((pending, err)) => {
                warn!(target: LOG_TARGET, identity, amount, %err, "refund failed, queued for retry");
                self.pending_credits.push(pending);
                Some((credit, false))
            }
        }
    }

    /// Aborts the running round and returns every stake in full. A table
    /// without a running round is left alone.
    pub(super) fn abort_round(&mut self, reason: AbortReason) -> RefundReport {
        let mut report = RefundReport::default();
        if !self.phase.holds_stakes() {
            return report;
        }

        self.timers.cancel_all();
        let staked: Vec<Seat> = self
            .registry
            .seats()
            .iter()
            .filter(|seat| seat.total_bet() > 0)
            .cloned()
            .collect();
        for seat in &staked {
            match self.refund_stake(seat.identity(), seat.total_bet(), reason) {
                Some((credit, true)) => report.credited.push(credit),
                Some((credit, false)) => report.pending.push(credit),
                None => {}
            }
        }

        info!(
            target: LOG_TARGET,
            ?reason,
            refunded = report.total_credited(),
            pending = report.total_pending(),
            "round aborted"
        );
        self.outbox.table(Outbound::Notice(TableNotice::new(
            NoticeKind::RoundAborted,
            "the round was aborted and every stake refunded",
        )));
        self.return_to_lobby();
        report
    }

    /// Retries every queued credit once.
    pub(super) fn retry_credits(&mut self) -> RefundReport {
        let mut report = RefundReport::default();
        for owed in std::mem::take(&mut self.pending_credits) {
            let identity = owed.identity.clone();
            match self.pay(owed) {
                Ok(settled) => {
                    info!(target: LOG_TARGET, identity = %identity, amount = settled.amount, "queued credit paid");
                    report.credited.push(Credit {
                        identity,
                        amount: settled.amount,
                    });
                }
                Err((pending, err)) => {
                    warn!(target: LOG_TARGET, identity = %identity, %err, "queued credit failed again");
                    report.pending.push(pending.owed());
                    self.pending_credits.push(pending);
                }
            }
        }
        report
    }
}
