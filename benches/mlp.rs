use criterion::{Criterion, black_box, criterion_group, criterion_main};

use mlp_classifier::{Mlp, MlpBuilder, loss};

const BATCH: usize = 64;

fn model() -> Mlp {
    MlpBuilder::new(128)
        .and_then(|b| b.hidden_layer(256))
        .and_then(|b| b.hidden_layer(256))
        .and_then(|b| b.output_layer(10))
        .and_then(|b| b.build_with_seed(0))
        .unwrap()
}

fn mlp_forward_bench(c: &mut Criterion) {
    let mlp = model();
    let mut scratch = mlp.batch_scratch(BATCH);
    let inputs = vec![0.1_f32; BATCH * mlp.input_dim()];

    c.bench_function("mlp_forward_batch64_128_256_256_10", |b| {
        b.iter(|| {
            let out = mlp.forward_batch(black_box(&inputs), BATCH, &mut scratch);
            black_box(out);
        })
    });
}

fn mlp_backward_bench(c: &mut Criterion) {
    let mlp = model();
    let classes = mlp.output_dim();
    let mut scratch = mlp.batch_scratch(BATCH);
    let mut grads = mlp.gradients(BATCH);
    let inputs = vec![0.1_f32; BATCH * mlp.input_dim()];
    let mut targets = vec![0.0_f32; BATCH * classes];
    for row in targets.chunks_exact_mut(classes) {
        row[0] = 1.0;
    }

    let logits = mlp.forward_batch(&inputs, BATCH, &mut scratch);
    let mut d = vec![0.0_f32; BATCH * classes];
    loss::softmax_cross_entropy_batch(logits, &targets, classes, &mut d);

    c.bench_function("mlp_backward_batch64_128_256_256_10", |b| {
        b.iter(|| {
            grads.d_output_mut(BATCH).copy_from_slice(&d);
            mlp.backward_batch(black_box(&inputs), BATCH, black_box(&scratch), &mut grads);
            black_box(grads.d_weights(0)[0]);
        })
    });
}

criterion_group!(benches, mlp_forward_bench, mlp_backward_bench);
criterion_main!(benches);
