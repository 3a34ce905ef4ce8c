//! Stacking game integration tests.

use std::sync::Arc;

use parlor::{
    Card, ConnectionId, GameCommand, GameSession, JoinOutcome, ManualClock, MoveError, Rejection,
    StackGame, StackOptions, StackPhase, StartError, Suit, TimerSlot,
};

const fn hearts(rank: u8) -> Card {
    Card::new(Suit::Hearts, rank)
}

const fn spades(rank: u8) -> Card {
    Card::new(Suit::Spades, rank)
}

const fn clubs(rank: u8) -> Card {
    Card::new(Suit::Clubs, rank)
}

/// ann holds 5♥ 7♥, bob holds 9♠ 2♣, 9♥ is face up.
fn two_player_game() -> StackGame {
    let clock = Arc::new(ManualClock::new(0));
    let mut game = StackGame::new(StackOptions::default().with_hand_size(2), 3, clock);
    game.join("ann", ConnectionId(1)).unwrap();
    game.join("bob", ConnectionId(2)).unwrap();
    game.stack_deck(&[hearts(5), spades(9), hearts(7), clubs(2), hearts(9)]);
    game.start("ann").unwrap();
    game
}

#[test]
fn start_needs_two_seated_players() {
    let clock = Arc::new(ManualClock::new(0));
    let mut game = StackGame::new(StackOptions::default(), 3, clock);
    game.join("ann", ConnectionId(1)).unwrap();

    assert_eq!(
        game.start("ann"),
        Err(Rejection::Start(StartError::NotEnoughPlayers { needed: 2 }))
    );
    assert_eq!(
        game.start("bob"),
        Err(Rejection::Start(StartError::NotSeated))
    );
    assert_eq!(game.phase(), StackPhase::Lobby);
}

#[test]
fn start_refuses_hands_one_deck_cannot_cover() {
    let clock = Arc::new(ManualClock::new(0));
    let mut game = StackGame::new(StackOptions::default().with_hand_size(13), 3, clock);
    for (id, identity) in ["ann", "bob", "cy", "dee"].into_iter().enumerate() {
        game.join(identity, ConnectionId(id as u64 + 1)).unwrap();
    }

    assert_eq!(
        game.start("ann"),
        Err(Rejection::Start(StartError::NotEnoughCards { needed: 53 }))
    );
    assert_eq!(game.phase(), StackPhase::Lobby);
    assert!(game.seat("dee").unwrap().hand().is_empty());
    assert!(game.timer(TimerSlot::Turn).is_none());

    assert!(game.leave("dee"));
    game.start("ann").unwrap();
    assert_eq!(game.phase(), StackPhase::Playing);
    assert_eq!(game.seat("cy").unwrap().hand().len(), 13);
    assert!(game.top_card().is_some());
}

#[test]
fn short_stacked_deck_falls_back_to_a_full_one() {
    let clock = Arc::new(ManualClock::new(0));
    let mut game = StackGame::new(StackOptions::default().with_hand_size(2), 3, clock);
    game.join("ann", ConnectionId(1)).unwrap();
    game.join("bob", ConnectionId(2)).unwrap();
    game.stack_deck(&[hearts(5), spades(9), hearts(7)]);
    game.start("ann").unwrap();

    assert_eq!(game.seat("ann").unwrap().hand().len(), 2);
    assert_eq!(game.seat("bob").unwrap().hand().len(), 2);
    assert!(game.top_card().is_some());
    assert_eq!(game.draw_pile(), 52 - 5);
}

#[test]
fn deal_hands_out_cards_and_turns_one_face_up() {
    let game = two_player_game();

    assert_eq!(game.phase(), StackPhase::Playing);
    assert_eq!(game.seat("ann").unwrap().hand(), [hearts(5), hearts(7)]);
    assert_eq!(game.seat("bob").unwrap().hand(), [spades(9), clubs(2)]);
    assert_eq!(game.top_card(), Some(hearts(9)));
    assert_eq!(game.draw_pile(), 0);
    assert_eq!(game.current_player(), Some("ann"));

    let view = game.project("bob");
    assert_eq!(view.your_hand, Some(vec![spades(9), clubs(2)]));
    assert!(!view.your_turn);
    assert_eq!(view.seats[0].cards, 2);
}

#[test]
fn only_matching_cards_may_be_played() {
    let mut game = two_player_game();

    assert_eq!(
        game.command("bob", GameCommand::Play { card: 0 }),
        Err(Rejection::Move(MoveError::NotYourTurn))
    );
    assert_eq!(
        game.command("ann", GameCommand::Play { card: 5 }),
        Err(Rejection::Move(MoveError::CardNotFound))
    );

    game.command("ann", GameCommand::Play { card: 1 }).unwrap();
    assert_eq!(game.top_card(), Some(hearts(7)));
    assert_eq!(game.current_player(), Some("bob"));

    let err = game
        .command("bob", GameCommand::Play { card: 1 })
        .unwrap_err();
    assert_eq!(err, Rejection::Move(MoveError::IllegalCard));
    assert_eq!(err.reason(), "illegal_card");
    assert_eq!(game.seat("bob").unwrap().hand().len(), 2);
}

#[test]
fn empty_draw_pile_recycles_the_discards() {
    let mut game = two_player_game();
    game.command("ann", GameCommand::Play { card: 1 }).unwrap();

    // Only 9♥ sits under the top card; it is the one card to come back.
    game.command("bob", GameCommand::Draw).unwrap();
    assert_eq!(game.seat("bob").unwrap().hand().len(), 3);
    assert!(game.seat("bob").unwrap().hand().contains(&hearts(9)));
    assert_eq!(game.top_card(), Some(hearts(7)));
    assert_eq!(game.draw_pile(), 0);
    assert_eq!(game.current_player(), Some("ann"));
}

#[test]
fn emptying_the_hand_wins_and_cooldown_clears_the_table() {
    let mut game = two_player_game();
    game.command("ann", GameCommand::Play { card: 1 }).unwrap();
    game.command("bob", GameCommand::Draw).unwrap();
    game.command("ann", GameCommand::Play { card: 0 }).unwrap();

    assert_eq!(game.phase(), StackPhase::Finished);
    assert_eq!(game.winner(), Some("ann"));
    assert!(game.timer(TimerSlot::Turn).is_none());

    let cooldown = game.timer(TimerSlot::Cooldown).cloned().unwrap();
    assert!(game.on_timer(&cooldown));
    assert_eq!(game.phase(), StackPhase::Lobby);
    assert!(game.seat("ann").unwrap().hand().is_empty());
    assert_eq!(game.project("ann").winner.as_deref(), Some("ann"));
}

#[test]
fn turn_timeout_draws_for_the_idle_player() {
    let mut game = two_player_game();
    let ticket = game.timer(TimerSlot::Turn).cloned().unwrap();

    assert!(game.on_timer(&ticket));
    assert_eq!(game.seat("ann").unwrap().hand().len(), 2);
    assert_eq!(game.current_player(), Some("bob"));

    // The same ticket cannot fire twice.
    assert!(!game.on_timer(&ticket));
    assert_eq!(game.current_player(), Some("bob"));
}

#[test]
fn latecomers_wait_for_the_next_game() {
    let mut game = two_player_game();
    assert_eq!(
        game.join("cy", ConnectionId(3)),
        Ok(JoinOutcome::Queued { position: 1 })
    );
    assert!(game.seat("cy").is_none());

    assert!(game.leave("bob"));
    assert_eq!(game.phase(), StackPhase::Finished);
    assert_eq!(game.winner(), Some("ann"));

    let cooldown = game.timer(TimerSlot::Cooldown).cloned().unwrap();
    game.on_timer(&cooldown);
    assert!(game.seat("cy").is_some());
    assert_eq!(game.project("cy").waitlist_position, None);
}

#[test]
fn betting_commands_are_unsupported() {
    let mut game = two_player_game();
    assert_eq!(
        game.command("ann", GameCommand::Bet { amount: 10 }),
        Err(Rejection::Unsupported("bet"))
    );
}
