// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Microbenchmarks for the forward-pass kernels and prompt encoding,
//! sized to the TinyStories 110M shapes.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use llama2_engine::{matmul, rmsnorm, softmax, Tokenizer};

const DIM: usize = 768;
const HIDDEN: usize = 2048;

fn filled(len: usize, step: f32) -> Vec<f32> {
    (0..len).map(|i| (i as f32 * step).sin()).collect()
}

fn bench_matmul(c: &mut Criterion) {
    let x = filled(DIM, 0.1);
    let w = filled(DIM * DIM, 0.01);
    let w_up = filled(DIM * HIDDEN, 0.01);
    let mut out = vec![0.0f32; DIM];
    let mut out_up = vec![0.0f32; HIDDEN];

    c.bench_function("matmul_768x768", |b| {
        b.iter(|| matmul(black_box(&mut out), black_box(&x), black_box(&w)))
    });
    c.bench_function("matmul_768x2048", |b| {
        b.iter(|| matmul(black_box(&mut out_up), black_box(&x), black_box(&w_up)))
    });
}

fn bench_rmsnorm(c: &mut Criterion) {
    let x = filled(DIM, 0.1);
    let weight = filled(DIM, 0.05);
    let mut out = vec![0.0f32; DIM];

    c.bench_function("rmsnorm_768", |b| {
        b.iter(|| rmsnorm(black_box(&mut out), black_box(&x), black_box(&weight)))
    });
}

fn bench_softmax(c: &mut Criterion) {
    let scores = filled(1024, 0.3);

    c.bench_function("softmax_1024", |b| {
        b.iter_batched(
            || scores.clone(),
            |mut scores| softmax(black_box(&mut scores)),
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_encode(c: &mut Criterion) {
    // Letter vocabulary plus a handful of merges, written out in the
    // binary tokenizer format so the bench exercises the real load path.
    let mut entries: Vec<(f32, String)> = vec![
        (0.0, "<unk>".to_string()),
        (0.0, "<s>".to_string()),
        (0.0, "</s>".to_string()),
        (-1.0, " ".to_string()),
    ];
    for (rank, letter) in ('a'..='z').enumerate() {
        entries.push((-2.0 - rank as f32, letter.to_string()));
    }
    for (rank, merge) in ["on", "ce", "up", "ti", "me", " a", "once", "time"]
        .iter()
        .enumerate()
    {
        entries.push((10.0 + rank as f32, merge.to_string()));
    }

    let mut data = 8i32.to_le_bytes().to_vec();
    for (score, piece) in &entries {
        data.extend(score.to_le_bytes());
        data.extend((piece.len() as i32).to_le_bytes());
        data.extend(piece.as_bytes());
    }
    let path = std::env::temp_dir().join(format!("textgen_bench_vocab_{}.bin", std::process::id()));
    std::fs::write(&path, &data).unwrap();
    let tokenizer = Tokenizer::load(&path, entries.len()).unwrap();
    let _ = std::fs::remove_file(&path);

    let prompt = "once upon a time there was a tiny model ".repeat(8);
    c.bench_function("encode_320_chars", |b| {
        b.iter(|| tokenizer.encode(black_box(&prompt), true, false))
    });
}

criterion_group!(
    benches,
    bench_matmul,
    bench_rmsnorm,
    bench_softmax,
    bench_encode
);
criterion_main!(benches);
