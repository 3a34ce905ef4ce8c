//! Blackjack table integration tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parlor::session::Delivery;
use parlor::{
    AbortReason, ActionError, BetError, BlackjackTable, Card, ConnectionId, GameCommand,
    GameSession, HandOutcome, HandStatus, JoinOutcome, Ledger, LedgerError, ManualClock,
    MemoryStore, Outbound, Phase, ProfitCap, Rejection, SeatStatus, StoreLedger, Suit,
    TableOptions, TimerSlot,
};

const fn card(rank: u8) -> Card {
    Card::new(Suit::Spades, rank)
}

type MemoryLedger = StoreLedger<MemoryStore>;

fn options() -> TableOptions {
    TableOptions::default().with_dealer_delay(Duration::ZERO)
}

fn table_with(options: TableOptions, cap: ProfitCap) -> (BlackjackTable, Arc<MemoryLedger>) {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let ledger = Arc::new(StoreLedger::new(MemoryStore::new(), 1_000, cap, clock.clone()));
    let table = BlackjackTable::new(options, 7, ledger.clone(), clock);
    (table, ledger)
}

fn table() -> (BlackjackTable, Arc<MemoryLedger>) {
    table_with(options(), ProfitCap::UNCAPPED)
}

/// Seats everybody, opens betting and stacks the shoe.
fn betting(table: &mut BlackjackTable, players: &[&str], draws: &[Card]) {
    for (index, identity) in players.iter().enumerate() {
        table.join(identity, ConnectionId(index as u64 + 1)).unwrap();
    }
    table.start(players[0]).unwrap();
    table.stack_shoe(draws);
}

fn bet(table: &mut BlackjackTable, identity: &str, amount: u64) {
    table
        .command(identity, GameCommand::Bet { amount })
        .unwrap();
}

fn payouts(table: &mut BlackjackTable) -> Vec<(String, Outbound)> {
    table
        .drain_effects()
        .deliveries
        .into_iter()
        .filter_map(|delivery| match delivery {
            Delivery::Viewer { identity, event } if matches!(event, Outbound::Payout { .. }) => {
                Some((identity, event))
            }
            _ => None,
        })
        .collect()
}

#[test]
fn stand_on_twenty_against_bust_and_dealer_nineteen() {
    let (mut table, ledger) = table();
    betting(
        &mut table,
        &["ann", "bob"],
        &[
            card(10),
            card(10),
            card(10), // dealer up
            card(13),
            card(6),
            card(9), // dealer hole
            card(10), // bob's hit
        ],
    );
    bet(&mut table, "ann", 100);
    assert_eq!(table.phase(), Phase::Betting);
    bet(&mut table, "bob", 100);

    assert_eq!(table.phase(), Phase::Playing);
    assert_eq!(table.current_player(), Some("ann"));
    assert_eq!(table.escrowed(), 200);

    table.command("ann", GameCommand::Stand).unwrap();
    assert_eq!(table.current_player(), Some("bob"));
    table.command("bob", GameCommand::Hit).unwrap();

    assert_eq!(table.phase(), Phase::Payout);
    let result = table.last_result().unwrap();
    assert_eq!(result.dealer_value, 19);
    assert_eq!(result.seats[0].hands[0].outcome, HandOutcome::Win);
    assert_eq!(result.seats[0].delta, 100);
    assert_eq!(result.seats[1].hands[0].outcome, HandOutcome::Lose);
    assert_eq!(result.seats[1].delta, -100);

    assert_eq!(ledger.balance("ann"), Ok(1_100));
    assert_eq!(ledger.balance("bob"), Ok(900));
    assert_eq!(table.escrowed(), 0);
    assert!(table.timer(TimerSlot::Cooldown).is_some());
}

#[test]
fn natural_pays_three_to_two() {
    let (mut table, ledger) = table();
    betting(&mut table, &["ann"], &[card(1), card(10), card(13), card(7)]);
    bet(&mut table, "ann", 100);

    assert_eq!(table.phase(), Phase::Payout);
    let seat = table.seat("ann").unwrap();
    assert_eq!(seat.hands()[0].status(), HandStatus::Blackjack);
    assert_eq!(seat.last_outcome(), 150);
    assert_eq!(ledger.balance("ann"), Ok(1_150));

    let sent = payouts(&mut table);
    assert_eq!(
        sent,
        vec![(
            "ann".to_owned(),
            Outbound::Payout {
                amount: 250,
                delta: 150,
                capped: 0,
                balance: 1_150,
            }
        )]
    );
}

#[test]
fn profit_cap_clips_only_the_profit() {
    let cap = ProfitCap {
        daily: Some(50),
        balance_percent: 0,
    };
    let (mut table, ledger) = table_with(options(), cap);
    betting(&mut table, &["ann"], &[card(1), card(10), card(13), card(7)]);
    bet(&mut table, "ann", 100);

    assert_eq!(ledger.balance("ann"), Ok(1_050));
    let sent = payouts(&mut table);
    assert_eq!(
        sent[0].1,
        Outbound::Payout {
            amount: 150,
            delta: 150,
            capped: 100,
            balance: 1_050,
        }
    );
}

#[test]
fn disconnect_mid_round_refunds_the_stake() {
    let (mut table, ledger) = table();
    betting(&mut table, &["ann"], &[card(10), card(10), card(6), card(7)]);
    bet(&mut table, "ann", 500);
    assert_eq!(table.phase(), Phase::Playing);
    assert_eq!(ledger.balance("ann"), Ok(500));

    // An older socket closing after a reconnect changes nothing.
    assert!(table.attach("ann", ConnectionId(9)));
    assert!(!table.disconnect("ann", ConnectionId(1)));
    assert_eq!(table.phase(), Phase::Playing);

    assert!(table.disconnect("ann", ConnectionId(9)));
    assert_eq!(table.phase(), Phase::Lobby);
    assert_eq!(table.escrowed(), 0);
    assert_eq!(ledger.balance("ann"), Ok(1_000));

    let refunds: Vec<_> = table
        .drain_effects()
        .deliveries
        .into_iter()
        .filter(|delivery| {
            matches!(
                delivery,
                Delivery::Viewer {
                    event: Outbound::Refund {
                        amount: 500,
                        reason: AbortReason::Disconnect
                    },
                    ..
                }
            )
        })
        .collect();
    assert_eq!(refunds.len(), 1);
}

#[test]
fn leaving_after_a_bust_keeps_the_loss() {
    let (mut table, ledger) = table();
    betting(
        &mut table,
        &["ann", "bob"],
        &[
            card(10),
            card(9),
            card(10), // dealer up
            card(6),
            card(8),
            card(7), // dealer hole
            card(10), // ann's hit
        ],
    );
    bet(&mut table, "ann", 100);
    bet(&mut table, "bob", 100);
    table.command("ann", GameCommand::Hit).unwrap();
    assert_eq!(
        table.seat("ann").unwrap().hands()[0].status(),
        HandStatus::Bust
    );
    assert_eq!(table.current_player(), Some("bob"));
    table.drain_effects();

    assert!(table.leave("ann"));
    assert_eq!(ledger.balance("ann"), Ok(900));
    assert_eq!(table.escrowed(), 100);
    assert!(table.validate_invariants().is_ok());
    assert_eq!(table.current_player(), Some("bob"));
    let refunded = table.drain_effects().deliveries.into_iter().any(|delivery| {
        matches!(
            delivery,
            Delivery::Viewer {
                event: Outbound::Refund { .. },
                ..
            }
        )
    });
    assert!(!refunded);

    // 17 against 17 is a push.
    table.command("bob", GameCommand::Stand).unwrap();
    assert_eq!(table.phase(), Phase::Payout);
    assert_eq!(table.last_result().unwrap().seats.len(), 1);
    assert_eq!(ledger.balance("bob"), Ok(1_000));
    assert_eq!(ledger.balance("ann"), Ok(900));
}

/// ann 17, bob 16, cat 17 against a dealer 18; ann has stood, bob acts.
fn three_seats_with_bob_to_act() -> (BlackjackTable, Arc<MemoryLedger>) {
    let (mut table, ledger) = table();
    betting(
        &mut table,
        &["ann", "bob", "cat"],
        &[
            card(10),
            card(9),
            card(8),
            card(10), // dealer up
            card(7),
            card(7),
            card(9),
            card(8), // dealer hole
        ],
    );
    for identity in ["ann", "bob", "cat"] {
        bet(&mut table, identity, 100);
    }
    table.command("ann", GameCommand::Stand).unwrap();
    assert_eq!(table.current_player(), Some("bob"));
    (table, ledger)
}

#[test]
fn leaving_on_your_turn_passes_it_on() {
    let (mut table, ledger) = three_seats_with_bob_to_act();
    let bobs = table.timer(TimerSlot::Turn).cloned().unwrap();

    assert!(table.leave("bob"));
    assert_eq!(ledger.balance("bob"), Ok(1_000));
    assert_eq!(table.escrowed(), 200);
    assert!(table.validate_invariants().is_ok());

    assert_eq!(table.current_player(), Some("cat"));
    assert_eq!(table.current_turn().seat_index, 1);
    let cats = table.timer(TimerSlot::Turn).cloned().unwrap();
    let target = cats.target.as_ref().unwrap();
    assert_eq!((target.identity.as_str(), target.hand), ("cat", 0));
    assert!(!table.on_timer(&bobs));
    assert_eq!(table.current_player(), Some("cat"));
}

#[test]
fn leaving_before_the_turn_keeps_it_in_place() {
    let (mut table, ledger) = three_seats_with_bob_to_act();
    table.command("bob", GameCommand::Stand).unwrap();
    assert_eq!(table.current_turn().seat_index, 2);
    let cats = table.timer(TimerSlot::Turn).cloned().unwrap();

    assert!(table.leave("ann"));
    assert_eq!(ledger.balance("ann"), Ok(1_000));
    assert_eq!(table.escrowed(), 200);
    assert!(table.validate_invariants().is_ok());
    assert_eq!(table.current_player(), Some("cat"));
    assert_eq!(table.current_turn().seat_index, 1);

    // The armed timer still belongs to cat.
    assert!(table.on_timer(&cats));
    assert_eq!(table.phase(), Phase::Payout);
    assert_eq!(ledger.balance("bob"), Ok(900));
    assert_eq!(ledger.balance("cat"), Ok(900));
    assert_eq!(table.escrowed(), 0);
}

#[test]
fn waitlisted_player_is_seated_after_the_round() {
    let (mut table, _) = table_with(options().with_seats(1), ProfitCap::UNCAPPED);
    assert_eq!(
        table.join("ann", ConnectionId(1)),
        Ok(JoinOutcome::Joined { seat: 0 })
    );
    table.start("ann").unwrap();
    table.stack_shoe(&[card(10), card(10), card(8), card(8)]);

    assert_eq!(
        table.join("bob", ConnectionId(2)),
        Ok(JoinOutcome::Queued { position: 1 })
    );
    assert_eq!(table.project("bob").waitlist_position, Some(1));

    bet(&mut table, "ann", 100);
    table.command("ann", GameCommand::Stand).unwrap();
    assert_eq!(table.phase(), Phase::Payout);

    assert!(table.leave("ann"));
    assert!(table.seat("bob").is_none());

    let cooldown = table.timer(TimerSlot::Cooldown).cloned().unwrap();
    assert!(table.on_timer(&cooldown));
    assert_eq!(table.seat("bob").map(|seat| seat.status()), Some(SeatStatus::Betting));
    assert_eq!(table.phase(), Phase::Betting);
}

#[test]
fn second_split_is_refused() {
    let (mut table, ledger) = table();
    betting(
        &mut table,
        &["ann"],
        &[card(8), card(10), card(8), card(7), card(3), card(8)],
    );
    bet(&mut table, "ann", 100);

    table.command("ann", GameCommand::Split).unwrap();
    let seat = table.seat("ann").unwrap();
    assert_eq!(seat.hands().len(), 2);
    assert_eq!(seat.hands()[0].score(), 11);
    assert_eq!(seat.hands()[1].score(), 16);
    assert_eq!(table.escrowed(), 200);
    assert_eq!(ledger.balance("ann"), Ok(800));

    assert_eq!(
        table.command("ann", GameCommand::Split),
        Err(Rejection::Action(ActionError::MaxSplitsReached))
    );
    assert_eq!(
        Rejection::Action(ActionError::MaxSplitsReached).reason(),
        "max_splits"
    );
}

#[test]
fn split_needs_a_pair() {
    let (mut table, ledger) = table();
    betting(&mut table, &["ann"], &[card(8), card(10), card(9), card(7)]);
    bet(&mut table, "ann", 100);

    let err = table.command("ann", GameCommand::Split).unwrap_err();
    assert_eq!(err, Rejection::Action(ActionError::CannotSplit));
    assert_eq!(err.reason(), "cannot_split");
    assert_eq!(ledger.balance("ann"), Ok(900));
    assert_eq!(table.escrowed(), 100);
}

#[test]
fn double_down_doubles_stake_and_payout() {
    let (mut table, ledger) = table();
    betting(
        &mut table,
        &["ann"],
        &[card(6), card(10), card(5), card(8), card(10)],
    );
    bet(&mut table, "ann", 100);
    table.command("ann", GameCommand::Double).unwrap();

    assert_eq!(table.phase(), Phase::Payout);
    let result = table.last_result().unwrap();
    assert_eq!(result.seats[0].stake, 200);
    assert_eq!(result.seats[0].delta, 200);
    assert_eq!(ledger.balance("ann"), Ok(1_200));
}

#[test]
fn bets_outside_the_limits_are_refused() {
    let (mut table, ledger) = table();
    betting(&mut table, &["ann"], &[]);

    assert_eq!(
        table.place_bet("ann", 0),
        Err(BetError::BelowMinimum { min: 1 })
    );
    assert_eq!(
        table.place_bet("ann", 501),
        Err(BetError::ExceedsLimit { max: 500 })
    );
    assert_eq!(table.place_bet("ann", 2_000), Err(BetError::InsufficientFunds));
    assert_eq!(table.place_bet("bob", 10), Err(BetError::NotSeated));
    assert_eq!(ledger.balance("ann"), Ok(1_000));
    assert_eq!(table.escrowed(), 0);
}

#[test]
fn stale_turn_timer_changes_nothing() {
    let (mut table, _) = table();
    betting(
        &mut table,
        &["ann", "bob"],
        &[card(10), card(10), card(10), card(6), card(6), card(9)],
    );
    bet(&mut table, "ann", 100);
    bet(&mut table, "bob", 100);

    let anns = table.timer(TimerSlot::Turn).cloned().unwrap();
    table.command("ann", GameCommand::Stand).unwrap();
    let bobs = table.timer(TimerSlot::Turn).cloned().unwrap();
    assert_ne!(anns.generation, bobs.generation);

    assert!(!table.on_timer(&anns));
    assert_eq!(table.current_player(), Some("bob"));
    assert!(table.seat("bob").unwrap().hands()[0].is_playing());

    assert!(table.on_timer(&bobs));
    assert_eq!(table.phase(), Phase::Payout);
    assert_eq!(
        table.seat("bob").unwrap().hands()[0].status(),
        HandStatus::Stand
    );
}

#[test]
fn betting_timeout_sits_out_silent_seats() {
    let (mut table, _) = table();
    betting(
        &mut table,
        &["ann", "bob"],
        &[card(10), card(10), card(9), card(7)],
    );
    bet(&mut table, "ann", 100);

    let betting = table.timer(TimerSlot::Betting).cloned().unwrap();
    assert!(table.on_timer(&betting));
    assert_eq!(table.phase(), Phase::Playing);
    assert_eq!(table.seat("bob").unwrap().status(), SeatStatus::Idle);
    assert_eq!(table.current_player(), Some("ann"));
}

#[test]
fn refund_all_is_idempotent() {
    let (mut table, ledger) = table();
    assert!(table.refund_all(AbortReason::Shutdown).is_empty());
    assert_eq!(table.phase(), Phase::Lobby);

    betting(&mut table, &["ann", "bob"], &[]);
    bet(&mut table, "ann", 300);
    let report = table.refund_all(AbortReason::Shutdown);

    assert_eq!(report.total_credited(), 300);
    assert!(report.pending.is_empty());
    assert_eq!(table.phase(), Phase::Lobby);
    assert_eq!(ledger.balance("ann"), Ok(1_000));
    assert!(table.refund_all(AbortReason::Shutdown).is_empty());
}

#[test]
fn money_is_conserved_across_settled_and_aborted_rounds() {
    let (mut table, ledger) = table();
    betting(
        &mut table,
        &["ann", "bob"],
        &[card(10), card(10), card(10), card(13), card(6), card(9), card(10)],
    );
    bet(&mut table, "ann", 200);
    bet(&mut table, "bob", 150);
    table.command("ann", GameCommand::Stand).unwrap();
    table.command("bob", GameCommand::Hit).unwrap();

    let deltas: i64 = table
        .last_result()
        .unwrap()
        .seats
        .iter()
        .map(|seat| seat.delta)
        .sum();
    let total = ledger.balance("ann").unwrap() + ledger.balance("bob").unwrap();
    assert_eq!(total as i64, 2_000 + deltas);

    let cooldown = table.timer(TimerSlot::Cooldown).cloned().unwrap();
    table.on_timer(&cooldown);
    assert_eq!(table.phase(), Phase::Betting);
    bet(&mut table, "ann", 100);
    table.refund_all(AbortReason::Shutdown);

    let after = ledger.balance("ann").unwrap() + ledger.balance("bob").unwrap();
    assert_eq!(after, total);
    assert_eq!(table.escrowed(), 0);
}

#[test]
fn dealer_hole_card_is_hidden_until_resolution() {
    let (mut table, _) = table();
    betting(&mut table, &["ann"], &[card(10), card(4), card(6), card(12)]);
    bet(&mut table, "ann", 100);

    let view = table.project("ann");
    assert!(view.your_turn);
    assert_eq!(view.dealer.cards, vec![Some(card(4)), None]);
    assert_eq!(view.dealer.value, 4);
    assert!(view.turn_deadline.is_some());
    assert!(!table.project("nobody").your_turn);
}

#[test]
fn paced_dealer_draws_one_card_per_reveal_timer() {
    let (mut table, ledger) = table_with(
        options().with_dealer_delay(Duration::from_millis(800)),
        ProfitCap::UNCAPPED,
    );
    // ann 20; the dealer shows 9 over 3 and needs two more cards.
    betting(
        &mut table,
        &["ann"],
        &[card(10), card(9), card(10), card(3), card(2), card(4)],
    );
    bet(&mut table, "ann", 100);
    table.command("ann", GameCommand::Stand).unwrap();

    assert_eq!(table.phase(), Phase::Resolving);
    assert!(table.timer(TimerSlot::Turn).is_none());
    let view = table.project("ann");
    assert_eq!(view.dealer.cards, vec![Some(card(9)), Some(card(3))]);
    assert_eq!(view.dealer.value, 12);

    let first = table.timer(TimerSlot::Reveal).cloned().unwrap();
    assert!(table.on_timer(&first));
    assert_eq!(table.phase(), Phase::Resolving);
    assert_eq!(table.project("ann").dealer.value, 14);

    let second = table.timer(TimerSlot::Reveal).cloned().unwrap();
    assert!(!table.on_timer(&first));
    assert_eq!(table.dealer().cards().len(), 3);

    assert!(table.on_timer(&second));
    assert_eq!(table.phase(), Phase::Payout);
    assert_eq!(table.dealer().value(), 18);
    assert!(table.timer(TimerSlot::Reveal).is_none());
    assert_eq!(ledger.balance("ann"), Ok(1_100));
    assert_eq!(table.escrowed(), 0);
}

/// A ledger whose credits can be switched off.
struct FlakyLedger {
    inner: MemoryLedger,
    down: AtomicBool,
}

impl Ledger for FlakyLedger {
    fn balance(&self, identity: &str) -> Result<u64, LedgerError> {
        self.inner.balance(identity)
    }

    fn credit(&self, identity: &str, amount: u64) -> Result<u64, LedgerError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("store offline".to_owned()));
        }
        self.inner.credit(identity, amount)
    }

    fn debit(&self, identity: &str, amount: u64) -> Result<u64, LedgerError> {
        self.inner.debit(identity, amount)
    }

    fn apply_daily_profit_cap(
        &self,
        identity: &str,
        profit: u64,
        balance: u64,
    ) -> Result<u64, LedgerError> {
        self.inner.apply_daily_profit_cap(identity, profit, balance)
    }
}

#[test]
fn failed_payout_is_queued_and_retried() {
    let clock = Arc::new(ManualClock::new(0));
    let ledger = Arc::new(FlakyLedger {
        inner: StoreLedger::new(MemoryStore::new(), 1_000, ProfitCap::UNCAPPED, clock.clone()),
        down: AtomicBool::new(false),
    });
    let mut table = BlackjackTable::new(options(), 1, ledger.clone(), clock);
    betting(&mut table, &["ann"], &[card(10), card(10), card(13), card(7)]);
    bet(&mut table, "ann", 100);

    ledger.down.store(true, Ordering::SeqCst);
    table.command("ann", GameCommand::Stand).unwrap();

    assert_eq!(table.phase(), Phase::Payout);
    assert_eq!(table.pending_credits().len(), 1);
    assert!(payouts(&mut table).is_empty());
    assert_eq!(ledger.balance("ann"), Ok(900));

    let report = table.retry_pending_credits();
    assert_eq!(report.total_pending(), 200);
    assert_eq!(table.pending_credits().len(), 1);

    ledger.down.store(false, Ordering::SeqCst);
    let report = table.retry_pending_credits();
    assert_eq!(report.total_credited(), 200);
    assert!(table.pending_credits().is_empty());
    assert_eq!(ledger.balance("ann"), Ok(1_100));
}

#[test]
fn commands_of_other_games_are_unsupported() {
    let (mut table, _) = table();
    table.join("ann", ConnectionId(1)).unwrap();
    let err = table.command("ann", GameCommand::React).unwrap_err();
    assert_eq!(err, Rejection::Unsupported("react"));
    assert_eq!(err.reason(), "unsupported_event");
}
