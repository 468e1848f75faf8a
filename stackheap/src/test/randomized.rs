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

use std::collections::VecDeque;

use rand::{rngs::SmallRng, Rng, SeedableRng};

use super::get_test_host;
use crate::WORD_SIZE;

/// Cell contents of a modeled block
#[derive(Clone, Copy, Debug)]
enum Cell {
    /// plain data, never looks like a heap address
    Value(usize),

    /// pointer to byte `offset` of block `target`
    Pointer { target: usize, offset: usize },
}

struct Block {
    address: usize,
    len: usize,
    cells: Vec<Cell>,
}

fn tag(block: usize, cell: usize) -> usize {
    usize::MAX - (block * 64 + cell)
}

/// Builds a random object graph, checks the scan against a model and
/// verifies that compaction keeps every reachable block and pointer intact.
fn run_random_graph(seed: u64) {
    const BLOCK_COUNT: usize = 40;

    let mut rand = SmallRng::seed_from_u64(seed);
    let mut host = get_test_host();

    let mut blocks: Vec<Block> = Vec::with_capacity(BLOCK_COUNT);
    for _ in 0..BLOCK_COUNT {
        let cell_count = rand.gen_range(1..=4);
        // some blocks get a few trailing bytes that never hold a cell
        let extra = if rand.gen_bool(0.2) {
            rand.gen_range(1..WORD_SIZE)
        } else {
            0
        };
        let len = cell_count * WORD_SIZE + extra;

        let address = host.allot(len).unwrap();
        host.drop().unwrap();
        blocks.push(Block {
            address,
            len,
            cells: vec![],
        });
    }

    for idx in 0..BLOCK_COUNT {
        let cell_count = blocks[idx].len / WORD_SIZE;
        for cell in 0..cell_count {
            let content = if rand.gen_bool(0.3) {
                let target = rand.gen_range(0..BLOCK_COUNT);
                let offset = rand.gen_range(0..blocks[target].len);
                Cell::Pointer { target, offset }
            } else {
                Cell::Value(tag(idx, cell))
            };
            blocks[idx].cells.push(content);
        }
    }

    let resolve = |blocks: &Vec<Block>, cell: Cell| match cell {
        Cell::Value(value) => value,
        Cell::Pointer { target, offset } => blocks[target].address + offset,
    };

    for idx in 0..BLOCK_COUNT {
        for (cell, content) in blocks[idx].cells.iter().enumerate() {
            host.store(
                blocks[idx].address + cell * WORD_SIZE,
                resolve(&blocks, *content),
            )
            .unwrap();
        }
    }

    // roots on the data stack, some of them interior pointers
    let mut roots = vec![];
    for _ in 0..4 {
        let target = rand.gen_range(0..BLOCK_COUNT);
        let offset = rand.gen_range(0..blocks[target].len);
        host.push(blocks[target].address + offset).unwrap();
        roots.push((target, offset));
    }

    // model reachability
    let mut reachable = vec![false; BLOCK_COUNT];
    let mut queue: VecDeque<usize> = roots.iter().map(|(target, _)| *target).collect();
    while let Some(idx) = queue.pop_front() {
        if reachable[idx] {
            continue;
        }
        reachable[idx] = true;
        for content in blocks[idx].cells.iter() {
            if let Cell::Pointer { target, .. } = content {
                queue.push_back(*target);
            }
        }
    }

    let expected_unreachable: usize = blocks
        .iter()
        .zip(reachable.iter())
        .filter(|(_, reachable)| !**reachable)
        .map(|(block, _)| block.len)
        .sum();
    assert_eq!(host.scan(), expected_unreachable, "seed {}", seed);

    let origin = blocks[0].address;
    host.collect().unwrap();

    // expected new addresses
    let mut next = origin;
    for (block, reachable) in blocks.iter_mut().zip(reachable.iter()) {
        if *reachable {
            block.address = next;
            next += block.len;
        }
    }
    assert_eq!(host.here(), next, "seed {}", seed);

    for (idx, block) in blocks.iter().enumerate() {
        if !reachable[idx] {
            continue;
        }

        for (cell, content) in block.cells.iter().enumerate() {
            assert_eq!(
                host.fetch(block.address + cell * WORD_SIZE).unwrap(),
                resolve(&blocks, *content),
                "seed {}, block {}, cell {}",
                seed,
                idx,
                cell
            );
        }
    }

    for (target, offset) in roots.iter().rev() {
        assert_eq!(host.pop().unwrap(), blocks[*target].address + offset);
    }
}

#[test]
fn test_random_graph_compaction() {
    const SEED: u64 = 5446535461589659585;

    let mut seeds = SmallRng::seed_from_u64(SEED);
    for _ in 0..20 {
        run_random_graph(seeds.gen());
    }
}
