//! Grid reconciliation: confirmed progress, pending fills, and candidate notes.
//!
//! The authority holds the solution, so a local fill is never applied to
//! `progress` directly. [`GridReconciler::record_pending`] marks the attempt,
//! and only the matching `cell_result` push moves a value into `progress`.
//! Candidate notes are purely local and are keyed to the puzzle id they were
//! taken against.
//!
//! Two kinds of inbound updates touch the grid:
//!
//! - **Snapshot** ([`GridReconciler::apply_snapshot`]) overwrites the givens,
//!   progress, and error count wholesale. It never merges with local state.
//! - **Delta** ([`GridReconciler::apply_cell_result`]) writes a single cell and
//!   the authoritative error count.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::protocol::CellResult;

/// Width and height of a Sudoku grid.
pub const GRID_SIZE: usize = 9;

/// Largest value a cell may hold.
pub const MAX_VALUE: u8 = 9;

// ── Grid ────────────────────────────────────────────────────────────

/// A 9×9 grid of cell values, `0` meaning blank.
///
/// On the wire a grid is an array of nine arrays of nine integers.
///
/// ```
/// use sudoku_duel_client::grid::Grid;
///
/// let mut grid = Grid::empty();
/// assert!(grid.set(4, 4, 7));
/// assert_eq!(grid.get(4, 4), Some(7));
/// assert_eq!(grid.get(9, 0), None);
/// assert_eq!(grid.filled_count(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<u8>>", into = "Vec<Vec<u8>>")]
pub struct Grid([[u8; GRID_SIZE]; GRID_SIZE]);

impl Grid {
    /// A grid with every cell blank.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a grid from fixed rows.
    pub fn from_rows(rows: [[u8; GRID_SIZE]; GRID_SIZE]) -> Self {
        Self(rows)
    }

    /// Value at `(row, col)`, or `None` when the coordinates are off the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<u8> {
        self.0.get(row)?.get(col).copied()
    }

    /// Write `value` at `(row, col)`. Returns `false` when the coordinates are
    /// off the grid or `value` is above 9.
    pub fn set(&mut self, row: usize, col: usize, value: u8) -> bool {
        if value > MAX_VALUE {
            return false;
        }
        match self.0.get_mut(row).and_then(|cells| cells.get_mut(col)) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    /// Number of non-blank cells.
    pub fn filled_count(&self) -> usize {
        self.0.iter().flatten().filter(|&&v| v != 0).count()
    }

    /// Whether every cell is blank.
    pub fn is_empty(&self) -> bool {
        self.filled_count() == 0
    }

    /// The raw rows.
    pub fn rows(&self) -> &[[u8; GRID_SIZE]; GRID_SIZE] {
        &self.0
    }

    /// Iterate `(row, col, value)` over every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, u8)> + '_ {
        self.0.iter().enumerate().flat_map(|(row, cells)| {
            cells
                .iter()
                .enumerate()
                .map(move |(col, &value)| (row, col, value))
        })
    }
}

/// Returned when a wire grid is not 9×9 or holds a value above 9.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridShapeError(String);

impl fmt::Display for GridShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed grid: {}", self.0)
    }
}

impl std::error::Error for GridShapeError {}

impl TryFrom<Vec<Vec<u8>>> for Grid {
    type Error = GridShapeError;

    fn try_from(rows: Vec<Vec<u8>>) -> Result<Self, Self::Error> {
        if rows.len() != GRID_SIZE {
            return Err(GridShapeError(format!("expected 9 rows, got {}", rows.len())));
        }
        let mut grid = Grid::empty();
        for (r, cells) in rows.iter().enumerate() {
            if cells.len() != GRID_SIZE {
                return Err(GridShapeError(format!(
                    "row {r} has {} cells",
                    cells.len()
                )));
            }
            for (c, &value) in cells.iter().enumerate() {
                if !grid.set(r, c, value) {
                    return Err(GridShapeError(format!("value {value} at ({r}, {c})")));
                }
            }
        }
        Ok(grid)
    }
}

impl From<Grid> for Vec<Vec<u8>> {
    fn from(grid: Grid) -> Self {
        grid.0.iter().map(|cells| cells.to_vec()).collect()
    }
}

/// Deserialize an optional grid, treating `null`, a missing field, or a
/// wrongly shaped value as absent instead of failing the whole message.
pub(crate) fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<Grid>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match serde_json::from_value::<Grid>(value) {
        Ok(grid) => Some(grid),
        Err(e) => {
            debug!("ignoring malformed grid in payload: {e}");
            None
        }
    }))
}

// ── Candidate notes ─────────────────────────────────────────────────

/// A set of candidate values `1..=9` for one cell.
///
/// Iteration always yields values in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CandidateSet(u16);

impl CandidateSet {
    /// The empty set.
    pub const fn new() -> Self {
        Self(0)
    }

    fn bit(value: u8) -> Option<u16> {
        (1..=MAX_VALUE).contains(&value).then(|| 1u16 << value)
    }

    /// Whether `value` is a candidate.
    pub fn contains(&self, value: u8) -> bool {
        Self::bit(value).is_some_and(|bit| self.0 & bit != 0)
    }

    /// Add `value` if absent, remove it if present. Values outside `1..=9`
    /// are ignored. Returns whether the value is present afterwards.
    pub fn toggle(&mut self, value: u8) -> bool {
        match Self::bit(value) {
            Some(bit) => {
                self.0 ^= bit;
                self.0 & bit != 0
            }
            None => false,
        }
    }

    /// Remove every candidate.
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Candidates in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (1..=MAX_VALUE).filter(move |&v| self.contains(v))
    }

    /// Candidates as an ascending vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.iter().collect()
    }
}

impl FromIterator<u8> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = Self::new();
        for value in iter {
            if !set.contains(value) {
                set.toggle(value);
            }
        }
        set
    }
}

/// Per-cell candidate notes, keyed to the puzzle they were taken against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotesOverlay {
    puzzle_id: Option<String>,
    cells: [[CandidateSet; GRID_SIZE]; GRID_SIZE],
}

impl NotesOverlay {
    /// An empty overlay with no puzzle key.
    pub fn new() -> Self {
        Self::default()
    }

    /// The puzzle id these notes belong to.
    pub fn puzzle_id(&self) -> Option<&str> {
        self.puzzle_id.as_deref()
    }

    /// Candidates at `(row, col)`, or `None` off the grid.
    pub fn get(&self, row: usize, col: usize) -> Option<CandidateSet> {
        self.cells.get(row)?.get(col).copied()
    }

    fn cell_mut(&mut self, row: usize, col: usize) -> Option<&mut CandidateSet> {
        self.cells.get_mut(row)?.get_mut(col)
    }

    /// Whether no cell holds a candidate.
    pub fn is_empty(&self) -> bool {
        self.cells.iter().flatten().all(CandidateSet::is_empty)
    }

    /// Wipe every cell and key the overlay to `puzzle_id`.
    pub fn reset(&mut self, puzzle_id: Option<String>) {
        self.cells = Default::default();
        self.puzzle_id = puzzle_id;
    }

    /// Re-key to `puzzle_id`, wiping the overlay if the id changed.
    /// Returns `true` if a wipe happened.
    pub fn rekey(&mut self, puzzle_id: Option<&str>) -> bool {
        if self.puzzle_id.as_deref() == puzzle_id {
            return false;
        }
        self.reset(puzzle_id.map(str::to_owned));
        true
    }

    /// Empty the set at `(row, col)`. Returns `false` off the grid.
    pub fn clear_cell(&mut self, row: usize, col: usize) -> bool {
        match self.cell_mut(row, col) {
            Some(set) => {
                set.clear();
                true
            }
            None => false,
        }
    }

    /// Toggle `value` at `(row, col)`; `None` off the grid.
    fn toggle(&mut self, row: usize, col: usize, value: u8) -> Option<bool> {
        self.cell_mut(row, col).map(|set| set.toggle(value))
    }

    /// Drop notes on every cell that is given or confirmed.
    fn prune(&mut self, givens: Option<&Grid>, progress: &Grid) {
        for (row, col, value) in progress.cells() {
            let given = givens.and_then(|g| g.get(row, col)).unwrap_or(0);
            if value != 0 || given != 0 {
                self.clear_cell(row, col);
            }
        }
    }
}

// ── Reconciler ──────────────────────────────────────────────────────

/// Local view of the board: givens, confirmed progress, the authoritative
/// error count, pending fill attempts, and candidate notes.
#[derive(Debug, Clone, Default)]
pub struct GridReconciler {
    puzzle_id: Option<String>,
    puzzle: Option<Grid>,
    progress: Grid,
    errors: u32,
    notes: NotesOverlay,
    pending: BTreeMap<(usize, usize), u8>,
    /// Cells that were pending when a snapshot arrived, with the value the
    /// snapshot confirmed there.
    superseded: BTreeMap<(usize, usize), u8>,
    last_cell_result: Option<CellResult>,
}

impl GridReconciler {
    /// An empty board with no puzzle loaded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a freshly started puzzle: empty progress, zero errors, no notes.
    pub fn start(&mut self, puzzle_id: Option<String>, puzzle: Grid) {
        debug!(puzzle_id = ?puzzle_id, "board: starting puzzle");
        self.notes.reset(puzzle_id.clone());
        self.puzzle_id = puzzle_id;
        self.puzzle = Some(puzzle);
        self.progress = Grid::empty();
        self.errors = 0;
        self.pending.clear();
        self.superseded.clear();
        self.last_cell_result = None;
    }

    /// Drop the puzzle and everything derived from it.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Overwrite the board from an authoritative snapshot.
    ///
    /// Notes are wiped if `puzzle_id` differs from the current key; otherwise
    /// they survive except on cells the snapshot shows as given or confirmed.
    /// Pending attempts are discarded.
    pub fn apply_snapshot(
        &mut self,
        puzzle_id: Option<String>,
        puzzle: Option<Grid>,
        progress: Option<Grid>,
        errors: u32,
    ) {
        let progress = progress.unwrap_or_default();
        if self.notes.rekey(puzzle_id.as_deref()) {
            debug!(puzzle_id = ?puzzle_id, "board: puzzle changed in snapshot, notes wiped");
        } else {
            self.notes.prune(puzzle.as_ref(), &progress);
        }
        self.superseded = std::mem::take(&mut self.pending)
            .into_keys()
            .map(|(row, col)| ((row, col), progress.get(row, col).unwrap_or(0)))
            .collect();
        self.puzzle_id = puzzle_id;
        self.puzzle = puzzle;
        self.progress = progress;
        self.errors = errors;
    }

    /// Apply a `cell_result` response. Returns `true` if `progress` changed.
    ///
    /// The error count is always overwritten. A correct result writes the cell
    /// and, for a non-zero value, clears that cell's notes. A result for a cell
    /// whose pending attempt was overtaken by a snapshot is not written when
    /// the snapshot confirmed a different value there.
    pub fn apply_cell_result(&mut self, result: &CellResult) -> bool {
        self.errors = result.errors;
        self.last_cell_result = Some(result.clone());

        let cell = (result.row, result.col);
        self.pending.remove(&cell);
        let snapshot_value = self.superseded.remove(&cell);

        if !result.correct {
            debug!(row = result.row, col = result.col, errors = result.errors, "board: fill rejected");
            return false;
        }
        if result.value > MAX_VALUE || self.progress.get(result.row, result.col).is_none() {
            warn!(row = result.row, col = result.col, value = result.value, "board: cell_result out of range");
            return false;
        }
        if self.is_given(result.row, result.col) {
            warn!(row = result.row, col = result.col, "board: cell_result targets a given cell");
            return false;
        }
        if let Some(confirmed) = snapshot_value {
            if confirmed != 0 && confirmed != result.value {
                debug!(
                    row = result.row,
                    col = result.col,
                    "board: stale cell_result contradicts snapshot, dropped"
                );
                return false;
            }
        }

        self.progress.set(result.row, result.col, result.value);
        if result.value != 0 {
            self.notes.clear_cell(result.row, result.col);
        }
        true
    }

    /// Whether a fill of `value` at `(row, col)` would be accepted by the authority.
    pub fn can_fill(&self, row: usize, col: usize, value: u8) -> bool {
        self.puzzle.is_some()
            && value <= MAX_VALUE
            && self.progress.get(row, col).is_some()
            && !self.is_given(row, col)
    }

    /// Remember an in-flight fill attempt. Returns `false` if the attempt is
    /// not fillable. A new attempt overrides any snapshot guard on the cell.
    pub fn record_pending(&mut self, row: usize, col: usize, value: u8) -> bool {
        if !self.can_fill(row, col, value) {
            return false;
        }
        self.superseded.remove(&(row, col));
        self.pending.insert((row, col), value);
        true
    }

    /// The in-flight attempt at `(row, col)`, if any.
    pub fn pending(&self, row: usize, col: usize) -> Option<u8> {
        self.pending.get(&(row, col)).copied()
    }

    /// Every in-flight attempt as `((row, col), value)`.
    pub fn pending_cells(&self) -> impl Iterator<Item = ((usize, usize), u8)> + '_ {
        self.pending.iter().map(|(&cell, &value)| (cell, value))
    }

    /// Toggle candidate `value` at `(row, col)`.
    ///
    /// No-op (returns `false`) when no puzzle is loaded, the cell is off the
    /// grid, given, or already confirmed, or `value` is outside `1..=9`.
    pub fn toggle_note(&mut self, row: usize, col: usize, value: u8) -> bool {
        if self.puzzle.is_none() || !(1..=MAX_VALUE).contains(&value) {
            return false;
        }
        if self.is_given(row, col) || self.progress.get(row, col).unwrap_or(0) != 0 {
            return false;
        }
        self.notes.toggle(row, col, value).is_some()
    }

    /// Empty the notes at `(row, col)`. Returns `false` off the grid.
    pub fn clear_notes(&mut self, row: usize, col: usize) -> bool {
        self.notes.clear_cell(row, col)
    }

    fn is_given(&self, row: usize, col: usize) -> bool {
        self.puzzle
            .as_ref()
            .and_then(|p| p.get(row, col))
            .is_some_and(|v| v != 0)
    }

    /// Current puzzle id.
    pub fn puzzle_id(&self) -> Option<&str> {
        self.puzzle_id.as_deref()
    }

    /// The givens, if a puzzle is loaded.
    pub fn puzzle(&self) -> Option<&Grid> {
        self.puzzle.as_ref()
    }

    /// Confirmed values.
    pub fn progress(&self) -> &Grid {
        &self.progress
    }

    /// Authoritative error count.
    pub fn errors(&self) -> u32 {
        self.errors
    }

    /// Candidate notes.
    pub fn notes(&self) -> &NotesOverlay {
        &self.notes
    }

    /// The most recent `cell_result`, for UI feedback.
    pub fn last_cell_result(&self) -> Option<&CellResult> {
        self.last_cell_result.as_ref()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn givens() -> Grid {
        let mut g = Grid::empty();
        g.set(0, 0, 5);
        g.set(8, 8, 9);
        g
    }

    fn result(row: usize, col: usize, value: u8, correct: bool, errors: u32) -> CellResult {
        CellResult {
            row,
            col,
            value,
            correct,
            errors,
            filled: None,
        }
    }

    fn started() -> GridReconciler {
        let mut board = GridReconciler::new();
        board.start(Some("p1".into()), givens());
        board
    }

    #[test]
    fn grid_rejects_wrong_shapes() {
        assert!(Grid::try_from(vec![vec![0; 9]; 8]).is_err());
        let mut rows = vec![vec![0; 9]; 9];
        rows[3] = vec![0; 10];
        assert!(Grid::try_from(rows).is_err());
        let mut rows = vec![vec![0; 9]; 9];
        rows[2][2] = 10;
        assert!(Grid::try_from(rows).is_err());
    }

    #[test]
    fn grid_wire_form_is_nested_arrays() {
        let json = serde_json::to_string(&givens()).unwrap();
        assert!(json.starts_with("[[5,0,0"));
        let back: Grid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, givens());
    }

    #[test]
    fn candidate_set_iterates_ascending() {
        let mut set = CandidateSet::new();
        for v in [7, 2, 9, 4] {
            set.toggle(v);
        }
        assert_eq!(set.to_vec(), vec![2, 4, 7, 9]);
        assert!(!set.toggle(4));
        assert_eq!(set.to_vec(), vec![2, 7, 9]);
        assert!(!set.toggle(0));
        assert!(!set.toggle(10));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn toggle_note_adds_then_removes() {
        let mut board = started();
        assert!(board.toggle_note(1, 1, 3));
        assert!(board.toggle_note(1, 1, 1));
        assert_eq!(board.notes().get(1, 1).unwrap().to_vec(), vec![1, 3]);
        assert!(board.toggle_note(1, 1, 3));
        assert_eq!(board.notes().get(1, 1).unwrap().to_vec(), vec![1]);
    }

    #[test]
    fn toggle_note_rejected_on_given_cell() {
        let mut board = started();
        let before = board.notes().clone();
        assert!(!board.toggle_note(0, 0, 5));
        assert_eq!(board.notes(), &before);
    }

    #[test]
    fn toggle_note_rejected_on_confirmed_cell_and_bad_values() {
        let mut board = started();
        assert!(board.apply_cell_result(&result(2, 2, 4, true, 0)));
        assert!(!board.toggle_note(2, 2, 1));
        assert!(!board.toggle_note(3, 3, 0));
        assert!(!board.toggle_note(3, 3, 10));
        assert!(!board.toggle_note(9, 3, 1));
        assert!(board.notes().is_empty());
    }

    #[test]
    fn toggle_note_requires_a_puzzle() {
        let mut board = GridReconciler::new();
        assert!(!board.toggle_note(1, 1, 1));
    }

    #[test]
    fn clear_notes_empties_cell() {
        let mut board = started();
        board.toggle_note(4, 4, 2);
        board.toggle_note(4, 4, 6);
        assert!(board.clear_notes(4, 4));
        assert!(board.notes().get(4, 4).unwrap().is_empty());
        assert!(!board.clear_notes(4, 9));
    }

    #[test]
    fn incorrect_result_keeps_progress_but_overwrites_errors() {
        let mut board = started();
        board.toggle_note(3, 3, 8);
        let before = *board.progress();
        assert!(!board.apply_cell_result(&result(3, 3, 8, false, 2)));
        assert_eq!(board.progress(), &before);
        assert_eq!(board.errors(), 2);
        assert_eq!(board.notes().get(3, 3).unwrap().to_vec(), vec![8]);
    }

    #[test]
    fn correct_result_clears_notes_and_writes_progress() {
        let mut board = started();
        board.toggle_note(3, 3, 8);
        board.toggle_note(3, 3, 1);
        assert!(board.apply_cell_result(&result(3, 3, 8, true, 0)));
        assert_eq!(board.progress().get(3, 3), Some(8));
        assert!(board.notes().get(3, 3).unwrap().is_empty());
    }

    #[test]
    fn correct_erase_keeps_notes() {
        let mut board = started();
        board.apply_cell_result(&result(5, 5, 3, true, 0));
        assert!(board.apply_cell_result(&result(5, 5, 0, true, 0)));
        assert_eq!(board.progress().get(5, 5), Some(0));
        assert!(board.toggle_note(5, 5, 3));
    }

    #[test]
    fn out_of_range_result_only_updates_errors() {
        let mut board = started();
        assert!(!board.apply_cell_result(&result(9, 0, 3, true, 1)));
        assert!(!board.apply_cell_result(&result(0, 0, 3, true, 1)));
        assert_eq!(board.errors(), 1);
        assert!(board.progress().is_empty());
    }

    #[test]
    fn pending_is_cleared_by_matching_result() {
        let mut board = started();
        assert!(board.record_pending(1, 2, 6));
        assert_eq!(board.pending(1, 2), Some(6));
        board.apply_cell_result(&result(1, 2, 6, false, 1));
        assert_eq!(board.pending(1, 2), None);
        assert!(!board.record_pending(0, 0, 1));
        assert!(!board.record_pending(1, 1, 10));
    }

    #[test]
    fn snapshot_with_new_puzzle_wipes_notes() {
        let mut board = started();
        board.toggle_note(1, 1, 1);
        board.apply_snapshot(Some("p2".into()), Some(Grid::empty()), None, 0);
        assert!(board.notes().is_empty());
        assert_eq!(board.notes().puzzle_id(), Some("p2"));
    }

    #[test]
    fn snapshot_with_same_puzzle_prunes_confirmed_cells_only() {
        let mut board = started();
        board.toggle_note(1, 1, 1);
        board.toggle_note(2, 2, 2);
        let mut progress = Grid::empty();
        progress.set(1, 1, 4);
        board.apply_snapshot(Some("p1".into()), Some(givens()), Some(progress), 1);
        assert!(board.notes().get(1, 1).unwrap().is_empty());
        assert_eq!(board.notes().get(2, 2).unwrap().to_vec(), vec![2]);
        assert_eq!(board.progress().get(1, 1), Some(4));
        assert_eq!(board.errors(), 1);
    }

    #[test]
    fn snapshot_discards_pending_and_wins_over_late_result() {
        let mut board = started();
        board.record_pending(1, 1, 3);
        board.record_pending(2, 2, 7);
        let mut progress = Grid::empty();
        progress.set(1, 1, 6);
        board.apply_snapshot(Some("p1".into()), Some(givens()), Some(progress), 0);
        assert_eq!(board.pending_cells().count(), 0);

        // Contradicts the snapshot: dropped.
        assert!(!board.apply_cell_result(&result(1, 1, 3, true, 0)));
        assert_eq!(board.progress().get(1, 1), Some(6));

        // Snapshot had the cell blank: consistent, applied.
        assert!(board.apply_cell_result(&result(2, 2, 7, true, 0)));
        assert_eq!(board.progress().get(2, 2), Some(7));
    }

    #[test]
    fn attempt_after_snapshot_is_not_treated_as_stale() {
        let mut board = started();
        assert!(board.apply_cell_result(&result(1, 1, 6, true, 0)));
        // Erase lost with the link.
        board.record_pending(1, 1, 0);
        let mut progress = Grid::empty();
        progress.set(1, 1, 6);
        board.apply_snapshot(Some("p1".into()), Some(givens()), Some(progress), 0);

        assert!(board.record_pending(1, 1, 0));
        assert!(board.apply_cell_result(&result(1, 1, 0, true, 0)));
        assert_eq!(board.progress().get(1, 1), Some(0));
    }

    #[test]
    fn lenient_grid_deserializer_treats_garbage_as_absent() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(default, deserialize_with = "deserialize_lenient")]
            grid: Option<Grid>,
        }
        let h: Holder = serde_json::from_str(r#"{"grid": null}"#).unwrap();
        assert!(h.grid.is_none());
        let h: Holder = serde_json::from_str(r#"{"grid": []}"#).unwrap();
        assert!(h.grid.is_none());
        let h: Holder = serde_json::from_str(r#"{}"#).unwrap();
        assert!(h.grid.is_none());
        let rows = serde_json::to_string(&givens()).unwrap();
        let h: Holder = serde_json::from_str(&format!(r#"{{"grid": {rows}}}"#)).unwrap();
        assert_eq!(h.grid, Some(givens()));
    }
}
