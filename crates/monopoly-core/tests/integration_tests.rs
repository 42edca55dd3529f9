//! Integration tests for the Monopoly game engine.
//!
//! These tests drive the engine through `apply_action` the way the server does,
//! from the first roll through to a winner.

use monopoly_core::*;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn new_game(names: &[&str]) -> (GameState, StdRng) {
    let mut rng = StdRng::seed_from_u64(2024);
    let mut game = GameState::new(&mut rng);
    for name in names {
        game.add_player(NewPlayer::human(*name)).unwrap();
    }
    game.take_events();
    (game, rng)
}

fn total_money(game: &GameState) -> i64 {
    game.players.iter().map(|p| p.money).sum()
}

#[test]
fn test_buying_a_square() {
    let (mut game, mut rng) = new_game(&["Alice", "Bob"]);

    game.players[0].position = 1;

    let log_len = game.log.len();
    let events = game
        .apply_action(1, GameAction::BuyProperty, 0, &mut rng)
        .unwrap();

    assert_eq!(
        events,
        vec![GameEvent::PropertyBought {
            player: 1,
            square: 1,
            price: 60
        }]
    );
    assert_eq!(game.player(1).unwrap().money, 1440);
    assert_eq!(game.squares[1].owner, Some(1));
    assert_eq!(game.log.len(), log_len + 1);
    assert_eq!(
        game.log.last().unwrap().message,
        "Alice bought Mediterranean Avenue for $60"
    );

    // Already owned
    assert_eq!(
        game.apply_action(1, GameAction::BuyProperty, 0, &mut rng),
        Err(GameError::NotPurchasable)
    );
}

#[test]
fn test_buying_after_a_roll() {
    let (mut game, mut rng) = new_game(&["Alice", "Bob"]);
    game.apply_roll(1, (1, 2), &mut rng).unwrap();
    assert_eq!(game.player(1).unwrap().position, 3);

    game.apply_action(1, GameAction::BuyProperty, 0, &mut rng)
        .unwrap();
    assert_eq!(game.squares[3].owner, Some(1));
    assert_eq!(
        game.apply_action(2, GameAction::BuyProperty, 0, &mut rng),
        Err(GameError::NotPurchasable)
    );
}

#[test]
fn test_rent_moves_money_between_players() {
    let (mut game, mut rng) = new_game(&["Alice", "Bob"]);
    game.squares[1].owner = Some(2);

    game.move_player(1, 1, &mut rng);

    assert_eq!(game.player(1).unwrap().money, 1498);
    assert_eq!(game.player(2).unwrap().money, 1502);
}

#[test]
fn test_bankrupt_owner_collects_no_rent() {
    let (mut game, mut rng) = new_game(&["Alice", "Bob", "Cara"]);
    game.squares[1].owner = Some(2);
    game.players[1].bankrupt = true;

    game.move_player(1, 1, &mut rng);
    assert_eq!(game.player(1).unwrap().money, 1500);
}

#[test]
fn test_bankruptcy_ends_two_player_game() {
    let (mut game, mut rng) = new_game(&["Alice", "Bob"]);
    game.players[0].money = 10;

    // Income Tax
    game.apply_roll(1, (1, 3), &mut rng).unwrap();
    let alice = game.player(1).unwrap();
    assert_eq!(alice.money, -190);
    assert!(alice.bankrupt);

    game.settle(0, &mut rng);
    assert!(game.is_finished());
    assert_eq!(game.winner(), Some(2));
    assert_eq!(game.current_player_id, Some(2));

    assert_eq!(
        game.apply_action(2, GameAction::EndTurn, 0, &mut rng),
        Err(GameError::GameOver)
    );
    assert_eq!(game.add_player(NewPlayer::human("Late")), Err(GameError::GameOver));
}

#[test]
fn test_bankrupt_current_player_is_skipped() {
    let (mut game, mut rng) = new_game(&["Alice", "Bob", "Cara"]);
    game.players[0].money = 10;

    game.apply_roll(1, (1, 3), &mut rng).unwrap();
    game.settle(0, &mut rng);

    assert!(!game.is_finished());
    assert_eq!(game.current_player_id, Some(2));
    assert_eq!(
        game.apply_action(1, GameAction::RollDice, 0, &mut rng),
        Err(GameError::Bankrupt)
    );
}

#[test]
fn test_auction_resolves_on_next_action_after_deadline() {
    let (mut game, mut rng) = new_game(&["Alice", "Bob"]);

    game.apply_action(1, GameAction::StartAuction { square: 39 }, 0, &mut rng)
        .unwrap();
    game.apply_action(2, GameAction::PlaceBid { amount: 50 }, 1_000, &mut rng)
        .unwrap();
    assert!(game.auction.is_some());

    // Even a rejected command closes an expired auction first
    let result = game.apply_action(2, GameAction::EndTurn, AUCTION_WINDOW_MS + 1, &mut rng);
    assert_eq!(result, Err(GameError::NotYourTurn));

    assert!(game.auction.is_none());
    assert_eq!(game.squares[39].owner, Some(2));
    assert_eq!(game.player(2).unwrap().money, 1450);
}

#[test]
fn test_three_doubles_send_player_to_jail() {
    let (mut game, mut rng) = new_game(&["Alice", "Bob"]);

    game.apply_roll(1, (6, 6), &mut rng).unwrap();
    game.apply_roll(1, (6, 6), &mut rng).unwrap();
    assert_eq!(game.doubles_streak, 2);
    game.apply_roll(1, (6, 6), &mut rng).unwrap();

    let alice = game.player(1).unwrap();
    assert_eq!(alice.position, 10);
    assert_eq!(alice.jail, JailStatus::Jailed { turns: 0 });
    assert_eq!(game.doubles_streak, 0);
    assert_eq!(game.phase, TurnPhase::TurnOver);
}

#[test]
fn test_chance_deck_reshuffles_after_sixteen_draws() {
    let (mut game, mut rng) = new_game(&["Alice", "Bob"]);

    for _ in 0..17 {
        game.draw_card(1, Deck::Chance, &mut rng);
    }

    assert_eq!(game.chance_pile.reshuffles, 1);
    let keeper = cards::keeper_index(Deck::Chance).unwrap();
    if game.player(1).unwrap().chance_jail_card {
        assert!(!game.chance_pile.order.contains(&keeper));
    }
    let drawn = game.log.iter().filter(|e| e.message.contains(" drew Chance: ")).count();
    assert_eq!(drawn, 17);
}

#[test]
fn test_transfers_between_players_conserve_money() {
    let (mut game, mut rng) = new_game(&["Alice", "Bob", "Cara"]);
    game.squares[5].owner = Some(3);
    game.squares[15].owner = Some(3);

    game.apply_action(1, GameAction::GiveMoney { to: 2, amount: 120 }, 0, &mut rng)
        .unwrap();
    game.move_player(2, 5, &mut rng);
    game.pay(3, 40, Some(1));

    let offer = TradeBundle {
        money: 75,
        ..TradeBundle::default()
    };
    let request = TradeBundle {
        squares: vec![5],
        ..TradeBundle::default()
    };
    game.apply_action(2, GameAction::ProposeTrade { to: 3, offer, request }, 0, &mut rng)
        .unwrap();
    game.apply_action(3, GameAction::AcceptTrade, 0, &mut rng)
        .unwrap();

    assert_eq!(game.squares[5].owner, Some(2));
    assert_eq!(total_money(&game), 4500);
}

#[test]
fn test_give_money_rejects_bad_amounts() {
    let (mut game, mut rng) = new_game(&["Alice", "Bob"]);
    assert_eq!(
        game.apply_action(1, GameAction::GiveMoney { to: 2, amount: 0 }, 0, &mut rng),
        Err(GameError::InvalidAmount)
    );
    assert_eq!(
        game.apply_action(1, GameAction::GiveMoney { to: 9, amount: 5 }, 0, &mut rng),
        Err(GameError::UnknownPlayer)
    );
}

#[test]
fn test_oversized_gift_is_rejected_before_any_money_moves() {
    let (mut game, mut rng) = new_game(&["Alice", "Bob"]);
    assert_eq!(
        game.apply_action(1, GameAction::GiveMoney { to: 2, amount: i64::MAX }, 0, &mut rng),
        Err(GameError::InvalidAmount)
    );
    assert_eq!(
        game.apply_action(
            1,
            GameAction::GiveMoney { to: 2, amount: MAX_TRANSFER + 1 },
            0,
            &mut rng
        ),
        Err(GameError::InvalidAmount)
    );
    assert_eq!(total_money(&game), 3000);
    assert!(game.players.iter().all(|p| !p.bankrupt));
}

#[test]
fn test_payments_saturate_instead_of_overflowing() {
    let (mut game, _rng) = new_game(&["Alice", "Bob"]);
    game.players[1].money = i64::MAX - 10;

    game.pay(1, 1_000, Some(2));
    assert_eq!(game.player(2).unwrap().money, i64::MAX);
    assert_eq!(game.player(1).unwrap().money, 500);
}

#[test]
fn test_npc_plays_its_turn_after_human_ends() {
    let mut rng = StdRng::seed_from_u64(77);
    let mut game = GameState::new(&mut rng);
    game.add_player(NewPlayer::human("Alice")).unwrap();
    game.add_player(NewPlayer::npc("Robo", "medium")).unwrap();

    let mut rolls = 0;
    while game.phase == TurnPhase::AwaitingRoll && rolls < 3 {
        game.apply_action(1, GameAction::RollDice, 0, &mut rng)
            .unwrap();
        rolls += 1;
    }
    game.apply_action(1, GameAction::EndTurn, 0, &mut rng)
        .unwrap();

    assert_eq!(game.current_player_id, Some(1));
    assert_eq!(game.turn, 2);
    assert!(game.log.iter().any(|e| e.message.starts_with("Robo rolled")));
}

#[test]
fn test_trade_with_npc_is_answered_immediately() {
    let mut rng = StdRng::seed_from_u64(5);
    let mut game = GameState::new(&mut rng);
    game.add_player(NewPlayer::human("Alice")).unwrap();
    game.add_player(NewPlayer::npc("Robo", "easy")).unwrap();
    game.squares[1].owner = Some(1);

    let offer = TradeBundle {
        squares: vec![1],
        ..TradeBundle::default()
    };
    let request = TradeBundle {
        money: 40,
        ..TradeBundle::default()
    };
    game.apply_action(1, GameAction::ProposeTrade { to: 2, offer, request }, 0, &mut rng)
        .unwrap();

    assert!(game.trade.is_none());
    assert_eq!(game.squares[1].owner, Some(2));
    assert_eq!(game.player(1).unwrap().money, 1540);
}

#[test]
fn test_full_color_group_allows_houses_and_raises_rent() {
    let (mut game, mut rng) = new_game(&["Alice", "Bob"]);
    game.squares[37].owner = Some(2);
    game.squares[39].owner = Some(2);

    game.apply_action(2, GameAction::BuildHouse { square: 39 }, 0, &mut rng)
        .unwrap();
    assert_eq!(game.rent_for(39), 200);

    game.players[0].position = 30;
    game.move_player(1, 9, &mut rng);
    assert_eq!(game.player(1).unwrap().money, 1300);
    assert_eq!(game.player(2).unwrap().money, 1300 + 200);
}

#[test]
fn test_actions_deserialize_from_wire_format() {
    let roll: GameAction = serde_json::from_str(r#"{"action":"rollDice"}"#).unwrap();
    assert_eq!(roll, GameAction::RollDice);

    let bid: GameAction =
        serde_json::from_str(r#"{"action":"placeBid","payload":{"amount":50}}"#).unwrap();
    assert_eq!(bid, GameAction::PlaceBid { amount: 50 });

    let trade: GameAction = serde_json::from_str(
        r#"{"action":"proposeTrade","payload":{"to":2,"offer":{"money":10},"request":{"squares":[1,3]}}}"#,
    )
    .unwrap();
    assert_eq!(
        trade,
        GameAction::ProposeTrade {
            to: 2,
            offer: TradeBundle {
                money: 10,
                ..TradeBundle::default()
            },
            request: TradeBundle {
                squares: vec![1, 3],
                ..TradeBundle::default()
            },
        }
    );
}

#[test]
fn test_state_survives_json_round_trip_mid_game() {
    let (mut game, mut rng) = new_game(&["Alice", "Bob"]);
    game.apply_roll(1, (1, 2), &mut rng).unwrap();
    game.apply_action(1, GameAction::BuyProperty, 0, &mut rng)
        .unwrap();

    let json = game.to_json().unwrap();
    assert!(json.contains("\"status\":\"open\""));
    assert!(json.contains("\"currentPlayerId\":1"));

    let restored = GameState::from_json(&json).unwrap();
    assert_eq!(restored, game);
}
