/// A candidate command that matched the palette query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaletteHit {
    /// Index of the student in the roster.
    pub index: usize,
    pub command: String,
    pub score: u32,
    /// Char positions in `command` that matched the query, for highlighting.
    pub positions: Vec<usize>,
}

/// Input line plus cursor over the current hits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Palette {
    pub query: String,
    pub selected: usize,
}

impl Palette {
    pub fn push(&mut self, c: char) {
        self.query.push(c);
        self.selected = 0;
    }

    pub fn pop(&mut self) {
        self.query.pop();
        self.selected = 0;
    }

    pub fn move_selection(&mut self, delta: isize, hit_count: usize) {
        if hit_count == 0 {
            self.selected = 0;
            return;
        }
        let next = self.selected as isize + delta;
        self.selected = next.clamp(0, hit_count as isize - 1) as usize;
    }
}

pub fn grade_command(student_name: &str) -> String {
    format!("grade {student_name}")
}

/// Case-insensitive subsequence match. Consecutive runs and matches at the
/// start of a word score higher. Whitespace in the query is ignored.
pub fn fuzzy_match(query: &str, candidate: &str) -> Option<(u32, Vec<usize>)> {
    let needle = query
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect::<Vec<_>>();
    if needle.is_empty() {
        return Some((0, Vec::new()));
    }

    let haystack = candidate.chars().collect::<Vec<_>>();
    (0..haystack.len())
        .filter(|&start| chars_match(haystack[start], needle[0]))
        .filter_map(|start| match_from(&needle, &haystack, start))
        .fold(None, |best: Option<(u32, Vec<usize>)>, candidate| match best {
            Some(best) if best.0 >= candidate.0 => Some(best),
            _ => Some(candidate),
        })
}

fn chars_match(c: char, target: char) -> bool {
    c.to_lowercase().eq(std::iter::once(target))
}

fn match_from(needle: &[char], haystack: &[char], start: usize) -> Option<(u32, Vec<usize>)> {
    let mut positions = Vec::with_capacity(needle.len());
    let mut score = 0;
    let mut wanted = needle.iter().peekable();
    for (pos, &c) in haystack.iter().enumerate().skip(start) {
        let Some(&&target) = wanted.peek() else {
            break;
        };
        if !chars_match(c, target) {
            continue;
        }
        score += 1;
        if positions.last().is_some_and(|&prev| prev + 1 == pos) {
            score += 2;
        }
        if pos == 0 || !haystack[pos - 1].is_alphanumeric() {
            score += 3;
        }
        positions.push(pos);
        wanted.next();
    }

    if wanted.peek().is_some() {
        None
    } else {
        Some((score, positions))
    }
}

/// Ranks `grade <name>` commands for every student; best score first, roster
/// order among ties. An empty query lists everyone.
pub fn search<'a>(query: &str, names: impl IntoIterator<Item = &'a str>) -> Vec<PaletteHit> {
    let mut hits = names
        .into_iter()
        .enumerate()
        .filter_map(|(index, name)| {
            let command = grade_command(name);
            fuzzy_match(query, &command).map(|(score, positions)| PaletteHit {
                index,
                command,
                score,
                positions,
            })
        })
        .collect::<Vec<_>>();
    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits
}
