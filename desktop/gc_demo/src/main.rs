/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use std::error::Error;

use env_logger::{Builder, Env};
use log::info;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use stackheap::{InterpreterHost, StackHeapConfig, WORD_SIZE};

const SEED: u64 = 5446535461589659585;
const ROUNDS: usize = 20;
const OPERATIONS_PER_ROUND: usize = 200;
const MAX_STACK_DEPTH: usize = 32;

/// Runs a random allocation workload against an interpreter heap and
/// prints the collector statistics after every collection.
fn main() -> Result<(), Box<dyn Error>> {
    Builder::from_env(Env::default())
        .filter_level(log::LevelFilter::Info)
        .format_module_path(false)
        .init();

    let mut rand = SmallRng::seed_from_u64(SEED);
    let mut host = InterpreterHost::new(&StackHeapConfig::default());

    let list = host.define_variable("LIST")?;

    for round in 0..ROUNDS {
        for _ in 0..OPERATIONS_PER_ROUND {
            match rand.gen_range(0..10) {
                // new block, stays on the stack for now
                0..=3 => {
                    if host.heap().depth() >= MAX_STACK_DEPTH {
                        host.drop()?;
                    }
                    host.allot(rand.gen_range(1..=4) * WORD_SIZE + rand.gen_range(0..3))?;
                }
                // link the top block into the list
                4 | 5 => {
                    if host.heap().depth() > 0 {
                        let block = host.pop()?;
                        let head = host.fetch(list)?;
                        host.store(block, head)?;
                        host.store(list, block)?;
                    }
                }
                // forget the list
                6 => host.store(list, 0)?,
                _ => {
                    if host.heap().depth() > 0 {
                        host.drop()?;
                    }
                }
            }
        }

        let unreachable = host.scan();
        let before = host.allocated_size();
        let result = host.collect()?;

        info!(
            "Round {}: {} of {} bytes unreachable, {} regions moved, {} pointers rewritten",
            round, unreachable, before, result.moved, result.rewritten
        );
    }

    println!("{}", serde_json::to_string_pretty(host.collector().stats())?);
    Ok(())
}
