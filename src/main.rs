use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use shakmaty::Color;

use plum_zero::cache::evaluation_cache::EvaluationCache;
use plum_zero::config::mcts_config::EngineConfig;
use plum_zero::engines::engine_mcts::MctsStrategy;
use plum_zero::engines::engine_random::RandomStrategy;
use plum_zero::engines::engine_trait::Strategy;
use plum_zero::game::game_controller::GameController;
use plum_zero::utils::pgn::read_pgn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Player {
    Mcts,
    Random,
}

/// Self-play driver for the neural-guided tree search.
#[derive(Debug, Parser)]
#[command(name = "plum_zero", version)]
struct Cli {
    /// TOML configuration with [white] and [black] tables.
    #[arg(long, default_value = "plum_zero.toml")]
    config: PathBuf,

    /// Number of games to play.
    #[arg(long, default_value_t = 1)]
    games: u32,

    /// Start from this position instead of the initial one.
    #[arg(long, conflicts_with = "resume")]
    fen: Option<String>,

    /// Continue the game recorded in this PGN file.
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Write each finished game to this PGN file (appending).
    #[arg(long)]
    pgn: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Player::Mcts)]
    white: Player,

    #[arg(long, value_enum, default_value_t = Player::Mcts)]
    black: Player,
}

fn build_strategy(
    player: Player,
    side: Color,
    config: &EngineConfig,
    cache: &Arc<EvaluationCache>,
    game_index: u32,
) -> Result<Box<dyn Strategy>> {
    let side_config = config.for_side(side).clone();
    Ok(match player {
        Player::Mcts => Box::new(
            MctsStrategy::new(side, side_config, Arc::clone(cache))
                .context("building MCTS strategy")?,
        ),
        Player::Random => Box::new(RandomStrategy::new(
            side,
            side_config.seed.wrapping_add(u64::from(game_index)),
        )),
    })
}

fn load_config(cli: &Cli) -> EngineConfig {
    match EngineConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            error!(
                "could not load {}: {err}; using defaults",
                cli.config.display()
            );
            EngineConfig::default()
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(&cli);
    let cache = Arc::new(EvaluationCache::new(config.cache_capacity));

    let resume = match &cli.resume {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Some(read_pgn(&text).context("parsing PGN")?)
        }
        None => None,
    };

    for game_index in 0..cli.games {
        let white = build_strategy(cli.white, Color::White, &config, &cache, game_index)?;
        let black = build_strategy(cli.black, Color::Black, &config, &cache, game_index)?;
        let mut controller = match (&resume, &cli.fen) {
            (Some(record), _) => {
                GameController::from_moves(record.initial_board.clone(), &record.moves, white, black)?
            }
            (None, Some(fen)) => GameController::from_fen(fen, white, black)?,
            (None, None) => GameController::new(white, black),
        };

        let (white_name, black_name) = controller.strategy_names();
        info!("game {} : {} vs {}", game_index + 1, white_name, black_name);
        let status = controller.play_all()?;
        println!("{}", controller.state());
        info!("game {} finished: {}", game_index + 1, status);

        if let Some(path) = &cli.pgn {
            let text = controller.pgn()?;
            let mut existing = std::fs::read_to_string(path).unwrap_or_default();
            if !existing.is_empty() {
                existing.push('\n');
            }
            existing.push_str(&text);
            std::fs::write(path, existing)
                .with_context(|| format!("writing {}", path.display()))?;
        }

        let stats = cache.stats();
        info!(
            "cache: {} entries, {} hits, {} misses, {} evictions",
            cache.len(),
            stats.hits,
            stats.misses,
            stats.evictions
        );
        if resume.is_some() && game_index + 1 < cli.games {
            warn!("--resume replays the same record for every game");
        }
    }
    Ok(())
}
