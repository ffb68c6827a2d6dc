//! PGN read/write utilities for game history interchange.
//!
//! Serializes a finished or running game to PGN text (SAN movetext) and
//! parses PGN back into an initial board plus move list so a game can be
//! resumed or replayed.

use std::collections::BTreeMap;

use chrono::Local;
use shakmaty::san::{San, SanPlus};
use shakmaty::{Chess, Position};

use crate::errors::{ChessError, ChessResult};
use crate::game_state::chess_rules::STARTING_POSITION_FEN;
use crate::game_state::chess_types::ChessMove;
use crate::game_state::game_state::GameState;
use crate::move_generation::move_generator::{board_fen, parse_fen};

#[derive(Debug, Clone)]
pub struct PgnGame {
    pub headers: BTreeMap<String, String>,
    pub initial_board: Chess,
    pub moves: Vec<ChessMove>,
    pub result: String,
}

/// Standard seven-tag roster for `game`, dated today.
pub fn default_headers(game: &GameState, white: &str, black: &str) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::<String, String>::new();
    headers.insert("Event".to_owned(), "Plum Zero Game".to_owned());
    headers.insert("Site".to_owned(), "Local".to_owned());
    headers.insert("Date".to_owned(), Local::now().format("%Y.%m.%d").to_string());
    headers.insert("Round".to_owned(), "-".to_owned());
    headers.insert("White".to_owned(), white.to_owned());
    headers.insert("Black".to_owned(), black.to_owned());
    headers.insert("Result".to_owned(), game.status().result_token().to_owned());
    if !game.starts_from_standard_position() {
        headers.insert("SetUp".to_owned(), "1".to_owned());
        headers.insert("FEN".to_owned(), board_fen(game.initial_board()));
    }
    headers
}

pub fn write_pgn(game: &GameState, white: &str, black: &str) -> ChessResult<String> {
    let headers = default_headers(game, white, black);
    write_pgn_with_headers(game.initial_board(), game.move_history(), &headers)
}

pub fn write_pgn_with_headers(
    initial_board: &Chess,
    moves: &[ChessMove],
    headers: &BTreeMap<String, String>,
) -> ChessResult<String> {
    let mut out = String::new();
    for (key, value) in headers {
        out.push_str(&format!("[{} \"{}\"]\n", key, escape_pgn_value(value)));
    }
    out.push('\n');

    let mut board = initial_board.clone();
    let first_fullmove = board.fullmoves().get() as usize;
    let black_first = board.turn().is_black();
    let mut parts = Vec::<String>::with_capacity(moves.len() + 1);
    for (ply, mv) in moves.iter().enumerate() {
        let inner = mv
            .inner()
            .filter(|m| board.is_legal(*m))
            .ok_or_else(|| ChessError::IllegalMove(mv.uci()))?;
        let san = SanPlus::from_move_and_play_unchecked(&mut board, inner);
        let offset = ply + usize::from(black_first);
        let number = first_fullmove + offset / 2;
        if offset % 2 == 0 {
            parts.push(format!("{}. {}", number, san));
        } else if ply == 0 {
            parts.push(format!("{}... {}", number, san));
        } else {
            parts.push(san.to_string());
        }
    }

    let result = headers
        .get("Result")
        .map(|x| normalize_result(x))
        .unwrap_or("*");
    parts.push(result.to_owned());
    out.push_str(&parts.join(" "));
    out.push('\n');
    Ok(out)
}

pub fn read_pgn(pgn: &str) -> ChessResult<PgnGame> {
    let mut headers = BTreeMap::<String, String>::new();
    let mut movetext_lines = Vec::<String>::new();

    for line in pgn.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('[') {
            let (k, v) = parse_header_line(trimmed)?;
            headers.insert(k, v);
        } else {
            movetext_lines.push(trimmed.to_owned());
        }
    }

    let initial_board = if headers.get("SetUp").map(|x| x.as_str()) == Some("1") {
        let fen = headers
            .get("FEN")
            .ok_or_else(|| pgn_error("SetUp is 1 but the FEN header is missing"))?;
        parse_fen(fen)?
    } else {
        parse_fen(STARTING_POSITION_FEN)?
    };

    let mut board = initial_board.clone();
    let mut moves = Vec::<ChessMove>::new();
    let mut result = "*".to_owned();

    let movetext = strip_pgn_comments_and_variations(&movetext_lines.join(" "));
    for token in movetext.split_whitespace() {
        let token = strip_move_number(token);
        if token.is_empty() {
            continue;
        }
        let cleaned = trim_annotation_suffix(token);
        if is_result_token(cleaned) {
            result = cleaned.to_owned();
            break;
        }
        let san: San = cleaned
            .parse()
            .map_err(|_| pgn_error(&format!("unreadable move '{cleaned}'")))?;
        let inner = san
            .to_move(&board)
            .map_err(|_| ChessError::IllegalMove(cleaned.to_owned()))?;
        moves.push(ChessMove::new(board.turn(), inner));
        board.play_unchecked(inner);
    }

    if let Some(header_result) = headers.get("Result") {
        result = normalize_result(header_result).to_owned();
    }

    Ok(PgnGame {
        headers,
        initial_board,
        moves,
        result,
    })
}

fn pgn_error(reason: &str) -> ChessError {
    ChessError::Config(format!("PGN: {reason}"))
}

fn parse_header_line(line: &str) -> ChessResult<(String, String)> {
    if !line.starts_with('[') || !line.ends_with(']') {
        return Err(pgn_error(&format!("invalid header line: {line}")));
    }
    let inner = &line[1..line.len() - 1];
    let mut parts = inner.splitn(2, ' ');
    let key = parts
        .next()
        .ok_or_else(|| pgn_error(&format!("invalid header key: {line}")))?
        .trim();
    let value_raw = parts
        .next()
        .ok_or_else(|| pgn_error(&format!("invalid header value: {line}")))?
        .trim();

    if !value_raw.starts_with('"') || !value_raw.ends_with('"') || value_raw.len() < 2 {
        return Err(pgn_error(&format!("unquoted header value: {line}")));
    }
    let value = value_raw[1..value_raw.len() - 1].replace("\\\"", "\"");
    Ok((key.to_owned(), value))
}

fn strip_pgn_comments_and_variations(text: &str) -> String {
    let mut out = String::new();
    let mut brace_depth = 0usize;
    let mut paren_depth = 0usize;

    for ch in text.chars() {
        match ch {
            '{' => brace_depth = brace_depth.saturating_add(1),
            '}' => brace_depth = brace_depth.saturating_sub(1),
            '(' => paren_depth = paren_depth.saturating_add(1),
            ')' => paren_depth = paren_depth.saturating_sub(1),
            _ if brace_depth == 0 && paren_depth == 0 => out.push(ch),
            _ => {}
        }
    }

    out
}

/// Drops a leading move number ("12." or "12...") from a token.
fn strip_move_number(token: &str) -> &str {
    let digits = token.trim_start_matches(|c: char| c.is_ascii_digit());
    if digits.len() == token.len() || !digits.starts_with('.') {
        return token;
    }
    digits.trim_start_matches('.')
}

fn trim_annotation_suffix(token: &str) -> &str {
    token.trim_end_matches(|c: char| matches!(c, '+' | '#' | '!' | '?'))
}

fn is_result_token(token: &str) -> bool {
    matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*")
}

fn normalize_result(result: &str) -> &str {
    if is_result_token(result) {
        result
    } else {
        "*"
    }
}

fn escape_pgn_value(value: &str) -> String {
    value.replace('"', "\\\"")
}
