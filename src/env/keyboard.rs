use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Width and height of a key cap, in key-pitch units.
pub const KEY_SIZE: f32 = 0.9;
/// Spacing between neighbouring braille dots inside a cell.
pub const DOT_SPACING: f32 = 0.25;

/// Keyboards the simulated sensor can explore.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum KeyboardLayout {
    Arrows,
    Alphabet,
}

impl KeyboardLayout {
    pub fn name(self) -> &'static str {
        match self {
            KeyboardLayout::Arrows => "arrows",
            KeyboardLayout::Alphabet => "alphabet",
        }
    }
}

/// A single key cap with its braille cell.
#[derive(Clone, Debug, PartialEq)]
pub struct Key {
    pub label: &'static str,
    pub dots: &'static [u8],
    pub center: [f32; 2],
}

impl Key {
    pub fn contains(&self, point: [f32; 2]) -> bool {
        let half = KEY_SIZE / 2.0;
        (point[0] - self.center[0]).abs() <= half && (point[1] - self.center[1]).abs() <= half
    }

    /// Positions of the raised dots in keyboard coordinates.
    ///
    /// Dots 1-3 run down the left column, 4-6 down the right one.
    pub fn dot_positions(&self) -> impl Iterator<Item = [f32; 2]> + '_ {
        self.dots.iter().map(move |&dot| {
            let index = dot.saturating_sub(1);
            let column = if index < 3 { -0.5 } else { 0.5 };
            let row = (index % 3) as f32 - 1.0;
            [
                self.center[0] + column * DOT_SPACING,
                self.center[1] + row * DOT_SPACING,
            ]
        })
    }
}

const ARROW_KEYS: [(&str, &[u8], [f32; 2]); 4] = [
    ("UP", &[1, 4], [1.0, 0.0]),
    ("LEFT", &[1, 2, 3], [0.0, 1.0]),
    ("DOWN", &[3, 6], [1.0, 1.0]),
    ("RIGHT", &[4, 5, 6], [2.0, 1.0]),
];

const ALPHABET_ROWS: [&str; 3] = ["qwertyuiop", "asdfghjkl", "zxcvbnm"];

fn letter_dots(letter: char) -> &'static [u8] {
    match letter {
        'a' => &[1],
        'b' => &[1, 2],
        'c' => &[1, 4],
        'd' => &[1, 4, 5],
        'e' => &[1, 5],
        'f' => &[1, 2, 4],
        'g' => &[1, 2, 4, 5],
        'h' => &[1, 2, 5],
        'i' => &[2, 4],
        'j' => &[2, 4, 5],
        'k' => &[1, 3],
        'l' => &[1, 2, 3],
        'm' => &[1, 3, 4],
        'n' => &[1, 3, 4, 5],
        'o' => &[1, 3, 5],
        'p' => &[1, 2, 3, 4],
        'q' => &[1, 2, 3, 4, 5],
        'r' => &[1, 2, 3, 5],
        's' => &[2, 3, 4],
        't' => &[2, 3, 4, 5],
        'u' => &[1, 3, 6],
        'v' => &[1, 2, 3, 6],
        'w' => &[2, 4, 5, 6],
        'x' => &[1, 3, 4, 6],
        'y' => &[1, 3, 4, 5, 6],
        'z' => &[1, 3, 5, 6],
        _ => &[],
    }
}

fn letter_label(letter: char) -> &'static str {
    const LABELS: [&str; 26] = [
        "A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R",
        "S", "T", "U", "V", "W", "X", "Y", "Z",
    ];
    LABELS[(letter as u8 - b'a') as usize]
}

/// Immutable key geometry for a layout.
#[derive(Clone, Debug)]
pub struct Keyboard {
    layout: KeyboardLayout,
    keys: Vec<Key>,
    min: [f32; 2],
    max: [f32; 2],
}

impl Keyboard {
    pub fn new(layout: KeyboardLayout) -> Self {
        let keys: Vec<Key> = match layout {
            KeyboardLayout::Arrows => ARROW_KEYS
                .iter()
                .map(|&(label, dots, center)| Key {
                    label,
                    dots,
                    center,
                })
                .collect(),
            KeyboardLayout::Alphabet => ALPHABET_ROWS
                .iter()
                .enumerate()
                .flat_map(|(row, letters)| {
                    letters.chars().enumerate().map(move |(column, letter)| Key {
                        label: letter_label(letter),
                        dots: letter_dots(letter),
                        center: [column as f32 + 0.5 * row as f32, row as f32],
                    })
                })
                .collect(),
        };
        let mut min = [f32::INFINITY; 2];
        let mut max = [f32::NEG_INFINITY; 2];
        for key in &keys {
            for axis in 0..2 {
                min[axis] = min[axis].min(key.center[axis] - 0.5);
                max[axis] = max[axis].max(key.center[axis] + 0.5);
            }
        }
        Self {
            layout,
            keys,
            min,
            max,
        }
    }

    pub fn layout(&self) -> KeyboardLayout {
        self.layout
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key(&self, index: usize) -> Option<&Key> {
        self.keys.get(index)
    }

    /// Index of the key whose cap contains `point`.
    pub fn key_at(&self, point: [f32; 2]) -> Option<usize> {
        self.keys.iter().position(|key| key.contains(point))
    }

    pub fn clamp(&self, point: [f32; 2]) -> [f32; 2] {
        [
            point[0].clamp(self.min[0], self.max[0]),
            point[1].clamp(self.min[1], self.max[1]),
        ]
    }

    pub fn bounds(&self) -> ([f32; 2], [f32; 2]) {
        (self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet_has_all_letters_with_distinct_cells() {
        let keyboard = Keyboard::new(KeyboardLayout::Alphabet);
        assert_eq!(keyboard.len(), 26);
        for (i, a) in keyboard.keys().iter().enumerate() {
            assert!(!a.dots.is_empty(), "{} has no dots", a.label);
            for b in &keyboard.keys()[i + 1..] {
                assert_ne!(a.dots, b.dots, "{} and {} share a cell", a.label, b.label);
            }
        }
    }

    #[test]
    fn key_lookup_respects_gaps() {
        let keyboard = Keyboard::new(KeyboardLayout::Arrows);
        let up = keyboard.key_at([1.0, 0.0]).expect("up key");
        assert_eq!(keyboard.key(up).map(|k| k.label), Some("UP"));
        // the slot left of UP is empty
        assert_eq!(keyboard.key_at([0.0, 0.0]), None);
        // gap between LEFT and DOWN
        assert_eq!(keyboard.key_at([0.5, 1.0]), None);
    }

    #[test]
    fn clamp_keeps_point_on_board() {
        let keyboard = Keyboard::new(KeyboardLayout::Arrows);
        let (min, max) = keyboard.bounds();
        let clamped = keyboard.clamp([-10.0, 10.0]);
        assert_eq!(clamped, [min[0], max[1]]);
    }

    #[test]
    fn dot_positions_follow_cell_numbering() {
        let keyboard = Keyboard::new(KeyboardLayout::Arrows);
        let right = &keyboard.keys()[3];
        let dots: Vec<[f32; 2]> = right.dot_positions().collect();
        assert_eq!(dots.len(), 3);
        assert!(dots.iter().all(|p| p[0] > right.center[0]));
        assert!(dots[0][1] < dots[2][1]);
    }
}
