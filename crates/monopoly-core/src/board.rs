//! Board representation: the 40 squares and their static data.
//!
//! This module contains:
//! - Square kinds and color groups
//! - The static board table (prices, rent tables, house costs)
//! - The mutable `Square` carried in the game state (owner, houses, mortgage)
//! - Board-wide constants (GO bonus, jail position, fine)

use serde::{Deserialize, Serialize};

/// Player identifier, unique within one game.
pub type PlayerId = u32;

/// Square identifier, the board index (0-39).
pub type SquareId = u8;

/// Number of squares around the board
pub const BOARD_SIZE: u8 = 40;

/// Paid when a move wraps past GO
pub const GO_BONUS: i64 = 200;

/// Where the jail sits on the board
pub const JAIL_POSITION: SquareId = 10;

/// Fine paid to leave jail
pub const JAIL_FINE: i64 = 50;

/// House count that represents a hotel
pub const HOTEL: u8 = 5;

/// Color groups of plain properties
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorGroup {
    Brown,
    LightBlue,
    Pink,
    Orange,
    Red,
    Yellow,
    Green,
    DarkBlue,
}

/// What a square does when a token lands on it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SquareKind {
    Go,
    Property,
    Railroad,
    Utility,
    IncomeTax,
    LuxuryTax,
    Chance,
    CommunityChest,
    Jail,
    FreeParking,
    GoToJail,
}

impl SquareKind {
    /// Whether squares of this kind can be bought
    pub fn is_purchasable(&self) -> bool {
        matches!(
            self,
            SquareKind::Property | SquareKind::Railroad | SquareKind::Utility
        )
    }

    /// Fixed amount charged by tax squares
    pub fn tax(&self) -> Option<i64> {
        match self {
            SquareKind::IncomeTax => Some(200),
            SquareKind::LuxuryTax => Some(100),
            _ => None,
        }
    }
}

/// Static data for one square
#[derive(Debug, Clone, Copy)]
pub struct SquareInfo {
    pub name: &'static str,
    pub kind: SquareKind,
    pub price: i64,
    pub rent: [i64; 6],
    pub group: Option<ColorGroup>,
    pub house_cost: i64,
}

const fn special(name: &'static str, kind: SquareKind) -> SquareInfo {
    SquareInfo {
        name,
        kind,
        price: 0,
        rent: [0; 6],
        group: None,
        house_cost: 0,
    }
}

const fn street(
    name: &'static str,
    group: ColorGroup,
    price: i64,
    rent: [i64; 6],
    house_cost: i64,
) -> SquareInfo {
    SquareInfo {
        name,
        kind: SquareKind::Property,
        price,
        rent,
        group: Some(group),
        house_cost,
    }
}

const fn railroad(name: &'static str) -> SquareInfo {
    SquareInfo {
        name,
        kind: SquareKind::Railroad,
        price: 200,
        rent: [0; 6],
        group: None,
        house_cost: 0,
    }
}

const fn utility(name: &'static str) -> SquareInfo {
    SquareInfo {
        name,
        kind: SquareKind::Utility,
        price: 150,
        rent: [0; 6],
        group: None,
        house_cost: 0,
    }
}

use ColorGroup::*;

/// The standard board, indexed by square id
pub static SQUARES: [SquareInfo; BOARD_SIZE as usize] = [
    special("GO", SquareKind::Go),
    street("Mediterranean Avenue", Brown, 60, [2, 10, 30, 90, 160, 250], 50),
    special("Community Chest", SquareKind::CommunityChest),
    street("Baltic Avenue", Brown, 60, [4, 20, 60, 180, 320, 450], 50),
    special("Income Tax", SquareKind::IncomeTax),
    railroad("Reading Railroad"),
    street("Oriental Avenue", LightBlue, 100, [6, 30, 90, 270, 400, 550], 50),
    special("Chance", SquareKind::Chance),
    street("Vermont Avenue", LightBlue, 100, [6, 30, 90, 270, 400, 550], 50),
    street("Connecticut Avenue", LightBlue, 120, [8, 40, 100, 300, 450, 600], 50),
    special("Jail", SquareKind::Jail),
    street("St. Charles Place", Pink, 140, [10, 50, 150, 450, 625, 750], 100),
    utility("Electric Company"),
    street("States Avenue", Pink, 140, [10, 50, 150, 450, 625, 750], 100),
    street("Virginia Avenue", Pink, 160, [12, 60, 180, 500, 700, 900], 100),
    railroad("Pennsylvania Railroad"),
    street("St. James Place", Orange, 180, [14, 70, 200, 550, 750, 950], 100),
    special("Community Chest", SquareKind::CommunityChest),
    street("Tennessee Avenue", Orange, 180, [14, 70, 200, 550, 750, 950], 100),
    street("New York Avenue", Orange, 200, [16, 80, 220, 600, 800, 1000], 100),
    special("Free Parking", SquareKind::FreeParking),
    street("Kentucky Avenue", Red, 220, [18, 90, 250, 700, 875, 1050], 150),
    special("Chance", SquareKind::Chance),
    street("Indiana Avenue", Red, 220, [18, 90, 250, 700, 875, 1050], 150),
    street("Illinois Avenue", Red, 240, [20, 100, 300, 750, 925, 1100], 150),
    railroad("B. & O. Railroad"),
    street("Atlantic Avenue", Yellow, 260, [22, 110, 330, 800, 975, 1150], 150),
    street("Ventnor Avenue", Yellow, 260, [22, 110, 330, 800, 975, 1150], 150),
    utility("Water Works"),
    street("Marvin Gardens", Yellow, 280, [24, 120, 360, 850, 1025, 1200], 150),
    special("Go To Jail", SquareKind::GoToJail),
    street("Pacific Avenue", Green, 300, [26, 130, 390, 900, 1100, 1275], 200),
    street("North Carolina Avenue", Green, 300, [26, 130, 390, 900, 1100, 1275], 200),
    special("Community Chest", SquareKind::CommunityChest),
    street("Pennsylvania Avenue", Green, 320, [28, 150, 450, 1000, 1200, 1400], 200),
    railroad("Short Line"),
    special("Chance", SquareKind::Chance),
    street("Park Place", DarkBlue, 350, [35, 175, 500, 1100, 1300, 1500], 200),
    special("Luxury Tax", SquareKind::LuxuryTax),
    street("Boardwalk", DarkBlue, 400, [50, 200, 600, 1400, 1700, 2000], 200),
];

/// A square as carried in the game state: static fields plus ownership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Square {
    pub id: SquareId,
    pub name: String,
    pub kind: SquareKind,
    pub price: i64,
    pub rent: [i64; 6],
    pub group: Option<ColorGroup>,
    pub house_cost: i64,
    /// Owning player, if any
    pub owner: Option<PlayerId>,
    /// 0-4 houses, 5 = hotel
    pub houses: u8,
    pub mortgaged: bool,
}

impl Square {
    fn from_info(id: SquareId, info: &SquareInfo) -> Self {
        Self {
            id,
            name: info.name.to_string(),
            kind: info.kind,
            price: info.price,
            rent: info.rent,
            group: info.group,
            house_cost: info.house_cost,
            owner: None,
            houses: 0,
            mortgaged: false,
        }
    }

    /// Unmortgaging costs the list price halved plus 10%, rounded up
    pub fn unmortgage_cost(&self) -> i64 {
        (self.price * 55 + 99) / 100
    }

    /// Amount the bank pays when the square is mortgaged
    pub fn mortgage_value(&self) -> i64 {
        self.price / 2
    }
}

/// The 40 squares in board order
pub fn standard_board() -> Vec<Square> {
    SQUARES
        .iter()
        .enumerate()
        .map(|(id, info)| Square::from_info(id as SquareId, info))
        .collect()
}

/// Ids of every square in a color group
pub fn group_members(group: ColorGroup) -> impl Iterator<Item = SquareId> {
    SQUARES
        .iter()
        .enumerate()
        .filter(move |(_, info)| info.group == Some(group))
        .map(|(id, _)| id as SquareId)
}

/// Forward distance from `from` to `to`, wrapping past GO
pub fn distance_forward(from: SquareId, to: SquareId) -> u8 {
    (to + BOARD_SIZE - from) % BOARD_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_has_forty_squares() {
        let board = standard_board();
        assert_eq!(board.len(), 40);
        assert_eq!(board[0].kind, SquareKind::Go);
        assert_eq!(board[JAIL_POSITION as usize].kind, SquareKind::Jail);
        assert_eq!(board[30].kind, SquareKind::GoToJail);
    }

    #[test]
    fn test_purchasable_counts() {
        let board = standard_board();
        let count = |kind| board.iter().filter(|s| s.kind == kind).count();
        assert_eq!(count(SquareKind::Property), 22);
        assert_eq!(count(SquareKind::Railroad), 4);
        assert_eq!(count(SquareKind::Utility), 2);
    }

    #[test]
    fn test_group_sizes() {
        assert_eq!(group_members(ColorGroup::Brown).count(), 2);
        assert_eq!(group_members(ColorGroup::DarkBlue).count(), 2);
        assert_eq!(group_members(ColorGroup::Green).count(), 3);
    }

    #[test]
    fn test_mortgage_amounts() {
        let board = standard_board();
        let mediterranean = &board[1];
        assert_eq!(mediterranean.mortgage_value(), 30);
        assert_eq!(mediterranean.unmortgage_cost(), 33);

        // 0.55 * 350 = 192.5 rounds up
        assert_eq!(board[37].unmortgage_cost(), 193);
    }

    #[test]
    fn test_distance_forward_wraps() {
        assert_eq!(distance_forward(36, 0), 4);
        assert_eq!(distance_forward(7, 24), 17);
        assert_eq!(distance_forward(39, 5), 6);
    }
}
