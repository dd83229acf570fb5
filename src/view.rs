//! ASCII rendering of a game session: a per-frame character grid plus
//! the manual/timed stepping loops the `play` binary drives (ported from
//! `views/ascii_view.py::ASCIIView`).

use std::io::{self, Write};
use std::time::Duration;

use crate::geometry::{Action, MapSize, Obstacle};
use crate::simulate::GameData;
use crate::state::State;

const FREE: char = '.';
const OBSTACLE: char = '#';
const AGENT: char = 'A';
const TARGET: char = 'T';
const OPPONENT: char = 'O';

/// The arrow glyph for an action, printed alongside each actor's line
/// in the per-tick summary.
pub fn action_glyph(action: Action) -> char {
    match action {
        Action::Up => '^',
        Action::Right => '>',
        Action::Down => 'v',
        Action::Left => '<',
    }
}

/// Render one frame: the obstacle layout with the three actors overlaid.
/// Rows print top (`y = M-1`) to bottom (`y = 0`) so the grid reads the
/// way a y-up coordinate system normally does on screen.
fn render_grid(map_size: &MapSize, obstacles: &[Obstacle], state: &State) -> String {
    let (n, m) = (map_size.n, map_size.m);
    let mut grid = vec![vec![FREE; n.max(0) as usize]; m.max(0) as usize];
    for obstacle in obstacles {
        for cell in obstacle.cells() {
            if cell.x >= 0 && cell.x < n && cell.y >= 0 && cell.y < m {
                grid[cell.y as usize][cell.x as usize] = OBSTACLE;
            }
        }
    }
    if map_size.contains(state.target) {
        grid[state.target.y as usize][state.target.x as usize] = TARGET;
    }
    if map_size.contains(state.opponent) {
        grid[state.opponent.y as usize][state.opponent.x as usize] = OPPONENT;
    }
    if map_size.contains(state.agent) {
        grid[state.agent.y as usize][state.agent.x as usize] = AGENT;
    }

    let mut out = String::new();
    for y in (0..m).rev() {
        for x in 0..n {
            out.push(grid[y as usize][x as usize]);
            out.push(' ');
        }
        out.push('\n');
    }
    out
}

/// Renders [`GameData`] snapshots against a fixed map, and drives the
/// manual (press Enter) or timed (sleep between frames) playback loops.
pub struct AsciiView {
    map_size: MapSize,
    obstacles: Vec<Obstacle>,
}

impl AsciiView {
    pub fn new(map_size: MapSize, obstacles: Vec<Obstacle>) -> Self {
        AsciiView { map_size, obstacles }
    }

    /// One frame: the grid plus a line naming each actor's executed
    /// action this tick.
    pub fn frame(&self, data: &GameData) -> String {
        let mut out = render_grid(&self.map_size, &self.obstacles, &data.state);
        out.push_str(&format!(
            "agent {} | opponent {} | target {}\n",
            action_glyph(data.agent_action),
            action_glyph(data.opponent_action),
            action_glyph(data.target_action),
        ));
        out
    }

    /// Print one frame per tick, blocking on an Enter keypress between
    /// frames.
    pub fn start_manual(&self, ticks: impl IntoIterator<Item = GameData>) -> io::Result<()> {
        let stdin = io::stdin();
        for data in ticks {
            print!("{}", self.frame(&data));
            io::stdout().flush()?;
            let mut discard = String::new();
            stdin.read_line(&mut discard)?;
        }
        Ok(())
    }

    /// Print one frame per tick, sleeping `time_step` between frames.
    pub fn start_auto(&self, ticks: impl IntoIterator<Item = GameData>, time_step: Duration) -> io::Result<()> {
        for data in ticks {
            print!("{}", self.frame(&data));
            io::stdout().flush()?;
            std::thread::sleep(time_step);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vec2D;

    #[test]
    fn render_grid_places_each_actor_and_obstacle() {
        let map_size = MapSize::new(3, 3);
        let obstacles = vec![Obstacle::new(Vec2D::new(1, 1), Vec2D::new(1, 1))];
        let state = State::new(Vec2D::new(0, 0), Vec2D::new(2, 0), Vec2D::new(0, 2));
        let rendered = render_grid(&map_size, &obstacles, &state);
        assert!(rendered.contains(AGENT));
        assert!(rendered.contains(TARGET));
        assert!(rendered.contains(OPPONENT));
        assert!(rendered.contains(OBSTACLE));
    }

    #[test]
    fn action_glyphs_are_distinct() {
        let glyphs: Vec<char> = [Action::Up, Action::Right, Action::Down, Action::Left]
            .into_iter()
            .map(action_glyph)
            .collect();
        let mut sorted = glyphs.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), glyphs.len());
    }

    #[test]
    fn frame_reports_all_three_actions() {
        let view = AsciiView::new(MapSize::new(2, 2), Vec::new());
        let data = GameData {
            state: State::new(Vec2D::new(0, 0), Vec2D::new(1, 1), Vec2D::new(1, 0)),
            agent_action: Action::Right,
            target_action: Action::Left,
            opponent_action: Action::Down,
        };
        let frame = view.frame(&data);
        assert!(frame.contains('>'));
        assert!(frame.contains('<'));
        assert!(frame.contains('v'));
    }
}
