use std::path::Path;

use crate::board::{Board, BoardFilter};
use crate::error::Result;
use crate::output::{self, Format};
use crate::store::repo::Repo;

pub fn run(repo_root: &Path, filter: BoardFilter, format: Format) -> Result<()> {
    let repo = Repo::open(repo_root)?;
    let board = Board::build(repo.db.list_all()?, &filter);
    output::print_board(&board, format)
}
