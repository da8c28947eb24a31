//! Tic-tac-toe on a 3x3 board. Seat 0 plays `X`, seat 1 plays `O`.

use parlor_protocol::{GameId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::games::{decode_data, encode_data, parse_move_data};
use crate::machine::{GameMachine, Outcome};
use crate::snapshot::{GameKind, GameStatus, Move, Player, Snapshot};
use crate::table::Table;

pub const MIN_PLAYERS: u8 = 2;
pub const MAX_PLAYERS: u8 = 2;

pub const MOVE_PLACE: &str = "place";

const WIN_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cell {
    Empty,
    X,
    O,
}

fn mark_for(seat: usize) -> Cell {
    if seat == 0 { Cell::X } else { Cell::O }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BoardData {
    board: [Cell; 9],
    winner: Option<UserId>,
}

impl Default for BoardData {
    fn default() -> Self {
        Self { board: [Cell::Empty; 9], winner: None }
    }
}

#[derive(Debug, Deserialize)]
struct PlaceParams {
    cell: usize,
}

#[derive(Debug)]
pub struct TicTacToeMachine {
    table: Table,
    data: BoardData,
}

impl TicTacToeMachine {
    pub fn new(id: GameId) -> Self {
        Self {
            table: Table::new(id, GameKind::TicTacToe, MIN_PLAYERS, MAX_PLAYERS),
            data: BoardData::default(),
        }
    }

    pub fn from_snapshot(snap: &Snapshot) -> Result<Self, EngineError> {
        if snap.kind != GameKind::TicTacToe {
            return Err(EngineError::Corrupted(format!(
                "snapshot is for {}, not tic_tac_toe",
                snap.kind
            )));
        }
        Ok(Self {
            table: Table::from_snapshot(snap, MIN_PLAYERS, MAX_PLAYERS)?,
            data: decode_data(snap)?,
        })
    }

    fn seat_of(&self, user: UserId) -> Result<usize, EngineError> {
        self.table
            .players
            .iter()
            .position(|p| p.id == user)
            .ok_or(EngineError::UnknownPlayer(user))
    }

    fn line_won_by(&self, mark: Cell) -> bool {
        WIN_LINES
            .iter()
            .any(|line| line.iter().all(|&idx| self.data.board[idx] == mark))
    }

    fn board_full(&self) -> bool {
        self.data.board.iter().all(|c| *c != Cell::Empty)
    }

    /// The cell that completes a line for `mark`, if one exists.
    fn completing_cell(&self, mark: Cell) -> Option<usize> {
        for line in WIN_LINES {
            let marks = line.iter().filter(|&&i| self.data.board[i] == mark).count();
            let empties: Vec<usize> = line
                .iter()
                .copied()
                .filter(|&i| self.data.board[i] == Cell::Empty)
                .collect();
            if marks == 2 && empties.len() == 1 {
                return Some(empties[0]);
            }
        }
        None
    }
}

impl GameMachine for TicTacToeMachine {
    fn kind(&self) -> GameKind {
        GameKind::TicTacToe
    }

    fn join(&mut self, player: Player) -> Result<(), EngineError> {
        self.table.join(player)
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.table.begin()
    }

    fn validate(&self, mv: &Move) -> Result<(), EngineError> {
        self.table.require_turn(mv.player)?;
        if mv.kind != MOVE_PLACE {
            return Err(EngineError::InvalidMove(format!(
                "unknown move '{}'",
                mv.kind
            )));
        }
        let params: PlaceParams = parse_move_data(mv)?;
        if params.cell >= 9 {
            return Err(EngineError::InvalidMove(format!(
                "cell {} is out of range",
                params.cell
            )));
        }
        if self.data.board[params.cell] != Cell::Empty {
            return Err(EngineError::InvalidMove(format!(
                "cell {} is occupied",
                params.cell
            )));
        }
        Ok(())
    }

    fn apply(&mut self, mv: &Move) -> Result<(), EngineError> {
        let params: PlaceParams = parse_move_data(mv)?;
        let seat = self.seat_of(mv.player)?;
        let mark = mark_for(seat);
        self.data.board[params.cell] = mark;
        self.table.record_move();

        if self.line_won_by(mark) {
            self.data.winner = Some(mv.player);
            if let Some(p) = self.table.player_mut(mv.player) {
                p.score += 1;
            }
            self.table.finish();
        } else if self.board_full() {
            self.table.finish();
        } else {
            self.table.advance_turn();
        }
        Ok(())
    }

    fn outcome(&self) -> Option<Outcome> {
        if self.table.status != GameStatus::Finished {
            return None;
        }
        Some(match self.data.winner {
            Some(winner) => Outcome::winner(winner),
            None => Outcome::Draw,
        })
    }

    fn mark_inactive(&mut self, user: UserId) -> Result<(), EngineError> {
        self.table.mark_inactive(user, true)?;
        match self.table.status {
            GameStatus::Playing => match self.table.active_ids().as_slice() {
                // Last player standing wins by forfeit.
                [last] => {
                    let last = *last;
                    self.data.winner = Some(last);
                    if let Some(p) = self.table.player_mut(last) {
                        p.score += 1;
                    }
                    self.table.finish();
                }
                [] => self.table.abandon(),
                _ => {}
            },
            GameStatus::Waiting if self.table.active_count() == 0 => {
                self.table.abandon();
            }
            _ => {}
        }
        Ok(())
    }

    fn suggest_move(&self, user: UserId) -> Option<Move> {
        if self.table.require_turn(user).is_err() {
            return None;
        }
        let seat = self.seat_of(user).ok()?;
        let mine = mark_for(seat);
        let theirs = mark_for(1 - seat);

        // Win > block > center > first free cell.
        let cell = self
            .completing_cell(mine)
            .or_else(|| self.completing_cell(theirs))
            .or_else(|| (self.data.board[4] == Cell::Empty).then_some(4))
            .or_else(|| self.data.board.iter().position(|c| *c == Cell::Empty))?;

        Some(Move::new(MOVE_PLACE, user, serde_json::json!({ "cell": cell })))
    }

    fn snapshot(&self) -> Result<Snapshot, EngineError> {
        Ok(self.table.snapshot_with(encode_data(&self.data)?))
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> TicTacToeMachine {
        let mut game = TicTacToeMachine::new(GameId(7));
        game.join(Player::new(UserId(1), "x")).unwrap();
        game.join(Player::new(UserId(2), "o")).unwrap();
        game.start().unwrap();
        game
    }

    fn place(game: &mut TicTacToeMachine, user: u64, cell: usize) {
        let mv = Move::new(MOVE_PLACE, UserId(user), serde_json::json!({ "cell": cell }));
        game.make_move(&mv).unwrap();
    }

    #[test]
    fn test_place_on_occupied_cell_rejected_without_state_change() {
        let mut game = started();
        place(&mut game, 1, 4);

        let mv = Move::new(MOVE_PLACE, UserId(2), serde_json::json!({ "cell": 4 }));
        let err = game.make_move(&mv).unwrap_err();
        match err {
            EngineError::InvalidMove(msg) => assert!(msg.contains("occupied")),
            other => panic!("expected InvalidMove, got {other:?}"),
        }

        // Still seat 1's turn and the board is unchanged.
        let snap = game.snapshot().unwrap();
        assert_eq!(snap.current_player_index, 1);
        assert_eq!(game.data.board[4], Cell::X);
    }

    #[test]
    fn test_place_out_of_range_rejected() {
        let mut game = started();
        let mv = Move::new(MOVE_PLACE, UserId(1), serde_json::json!({ "cell": 9 }));
        assert!(matches!(
            game.make_move(&mv),
            Err(EngineError::InvalidMove(_))
        ));
    }

    #[test]
    fn test_place_out_of_turn_rejected() {
        let mut game = started();
        let mv = Move::new(MOVE_PLACE, UserId(2), serde_json::json!({ "cell": 0 }));
        assert!(matches!(
            game.make_move(&mv),
            Err(EngineError::NotYourTurn(UserId(2)))
        ));
    }

    #[test]
    fn test_row_win_finishes_and_scores() {
        let mut game = started();
        place(&mut game, 1, 0);
        place(&mut game, 2, 3);
        place(&mut game, 1, 1);
        place(&mut game, 2, 4);
        place(&mut game, 1, 2);

        let snap = game.snapshot().unwrap();
        assert_eq!(snap.status, GameStatus::Finished);
        assert_eq!(snap.players[0].score, 1);
        assert_eq!(snap.players[1].score, 0);
        assert_eq!(game.outcome(), Some(Outcome::winner(UserId(1))));
    }

    #[test]
    fn test_full_board_without_line_is_draw() {
        let mut game = started();
        for (user, cell) in [(1, 0), (2, 1), (1, 2), (2, 4), (1, 3), (2, 5), (1, 7), (2, 6), (1, 8)]
        {
            place(&mut game, user, cell);
        }
        assert_eq!(game.outcome(), Some(Outcome::Draw));
        let snap = game.snapshot().unwrap();
        assert_eq!(snap.players[0].score, 0);
        assert_eq!(snap.players[1].score, 0);
    }

    #[test]
    fn test_move_after_finish_rejected() {
        let mut game = started();
        place(&mut game, 1, 0);
        place(&mut game, 2, 3);
        place(&mut game, 1, 1);
        place(&mut game, 2, 4);
        place(&mut game, 1, 2);

        let mv = Move::new(MOVE_PLACE, UserId(2), serde_json::json!({ "cell": 5 }));
        assert!(matches!(
            game.make_move(&mv),
            Err(EngineError::WrongStatus(GameStatus::Finished))
        ));
    }

    #[test]
    fn test_departure_forfeits_to_remaining_player() {
        let mut game = started();
        place(&mut game, 1, 0);

        game.mark_inactive(UserId(2)).unwrap();
        assert_eq!(game.outcome(), Some(Outcome::winner(UserId(1))));
        let snap = game.snapshot().unwrap();
        assert_eq!(snap.players[0].score, 1);
    }

    #[test]
    fn test_suggest_takes_winning_cell_over_block() {
        let mut game = started();
        place(&mut game, 1, 0);
        place(&mut game, 2, 3);
        place(&mut game, 1, 1);
        place(&mut game, 2, 4);

        // Seat 0 can win at 2; seat 1 threatens at 5.
        let mv = game.suggest_move(UserId(1)).unwrap();
        assert_eq!(mv.data["cell"], 2);
    }

    #[test]
    fn test_suggest_blocks_opponent_line() {
        let mut game = started();
        place(&mut game, 1, 0);
        place(&mut game, 2, 4);
        place(&mut game, 1, 1);

        // Seat 1 must block at 2.
        let mv = game.suggest_move(UserId(2)).unwrap();
        assert_eq!(mv.data["cell"], 2);
    }

    #[test]
    fn test_suggest_none_when_not_their_turn() {
        let game = started();
        assert!(game.suggest_move(UserId(2)).is_none());
    }

    #[test]
    fn test_restore_resumes_mid_game() {
        let mut game = started();
        place(&mut game, 1, 4);
        let snap = game.snapshot().unwrap();

        let mut resumed = TicTacToeMachine::from_snapshot(&snap).unwrap();
        place(&mut resumed, 2, 0);
        assert_eq!(resumed.data.board[4], Cell::X);
        assert_eq!(resumed.data.board[0], Cell::O);
    }

    #[test]
    fn test_restore_rejects_wrong_kind() {
        let game = started();
        let mut snap = game.snapshot().unwrap();
        snap.kind = GameKind::Rps;
        assert!(matches!(
            TicTacToeMachine::from_snapshot(&snap),
            Err(EngineError::Corrupted(_))
        ));
    }
}
