// cnn_demo.rs
// Demo driver for the CNN inference engine: builds the reference topology
// (28x28 input -> 16 3x3 kernels -> 2x2 max pool -> 2704x10 softmax head)
// and runs single-sample SGD steps over synthetic images.
//
// Usage:
//   cnn_demo [model.json]
//
// Output:
//   - logs/training_loss_cnn.txt (step,loss,accuracy)
//   - logs/trained_params.json (descriptor of the updated parameters)

use std::env;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::process;

use cnn_engine::layers::{ConvolutionLayer, Layer, MaxPoolingLayer, SoftMaxLayer};
use cnn_engine::model::{load_model, save_model};
use cnn_engine::network::train_step;
use cnn_engine::tensor::Tensor;
use cnn_engine::utils::SimpleRng;

// Reference topology (images are 28x28 grayscale).
const IMG_H: usize = 28;
const IMG_W: usize = 28;
const NUM_CLASSES: usize = 10;
const KERNEL_NUM: usize = 16;
const KERNEL_SIZE: usize = 3;
const POOL: usize = 2;

const CONV_H: usize = IMG_H - KERNEL_SIZE + 1; // 26
const CONV_W: usize = IMG_W - KERNEL_SIZE + 1; // 26
const FC_IN: usize = (CONV_H / POOL) * (CONV_W / POOL) * KERNEL_NUM; // 13*13*16 = 2704

// Demo parameters.
const LEARNING_RATE: f64 = 0.01;
const STEPS: usize = 100;
const REPORT_EVERY: usize = 10;
const SEED: u64 = 1;

// Build the reference topology with Gaussian-initialized parameters.
fn init_layers(rng: &mut SimpleRng) -> Vec<Layer> {
    let conv = Layer::Convolution(ConvolutionLayer::new(KERNEL_NUM, KERNEL_SIZE, rng));
    let pool = Layer::MaxPooling(MaxPoolingLayer::new(POOL));

    // Small head weights keep the untrained logits inside the range the
    // unstabilized softmax can exponentiate.
    let weight = Tensor::randn(&[FC_IN, NUM_CLASSES], 0.01, rng);
    let bias = Tensor::zeros(&[NUM_CLASSES]);
    let head = match SoftMaxLayer::from_parameters(weight, bias) {
        Ok(head) => Layer::SoftMax(head),
        Err(err) => {
            eprintln!("Could not initialize classifier head: {}", err);
            process::exit(1);
        }
    };

    vec![conv, pool, head]
}

// Synthesize a raw grayscale image with pixel values in [0, 255).
fn synthetic_image(rng: &mut SimpleRng) -> Tensor {
    let pixels: Vec<f64> = (0..IMG_H * IMG_W)
        .map(|_| rng.gen_range_f64(0.0, 255.0))
        .collect();
    match Tensor::from_flat(pixels, &[IMG_H, IMG_W]) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("Could not build synthetic image: {}", err);
            process::exit(1);
        }
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut rng = SimpleRng::new(SEED);

    let mut layers = if let Some(path) = args.get(1) {
        println!("Loading model from {}...", path);
        match load_model(path, &mut rng) {
            Ok(layers) => layers,
            Err(err) => {
                eprintln!("Could not load model {}: {}", path, err);
                process::exit(1);
            }
        }
    } else {
        println!("Initializing model with seed {}...", SEED);
        init_layers(&mut rng)
    };

    // Training log file.
    fs::create_dir_all("./logs").ok();
    let log_file = File::create("./logs/training_loss_cnn.txt").unwrap_or_else(|_| {
        eprintln!("Could not create logs/training_loss_cnn.txt");
        process::exit(1);
    });
    let mut log = BufWriter::new(log_file);

    println!(
        "Training: steps={} lr={} topology={}x{} -> {}x{}x{} -> {} -> {}",
        STEPS,
        LEARNING_RATE,
        IMG_H,
        IMG_W,
        CONV_H,
        CONV_W,
        KERNEL_NUM,
        FC_IN,
        NUM_CLASSES
    );

    let mut total_loss = 0.0f64;
    let mut correct = 0usize;

    for step in 0..STEPS {
        let image = synthetic_image(&mut rng);
        let label = step % NUM_CLASSES;

        let outcome = match train_step(&image, label, &mut layers, LEARNING_RATE) {
            Ok(outcome) => outcome,
            Err(err) => {
                eprintln!("Training step {} failed: {}", step, err);
                process::exit(1);
            }
        };

        total_loss += outcome.loss;
        if outcome.accuracy {
            correct += 1;
        }
        writeln!(log, "{},{},{}", step + 1, outcome.loss, outcome.accuracy as u8).ok();

        if (step + 1) % REPORT_EVERY == 0 {
            println!(
                "Step {} | avg loss={:.6} | accuracy={:.1}%",
                step + 1,
                total_loss / (step + 1) as f64,
                100.0 * correct as f64 / (step + 1) as f64
            );
        }
    }

    if let Err(err) = save_model("./logs/trained_params.json", &layers) {
        eprintln!("Could not save trained parameters: {}", err);
        process::exit(1);
    }
    println!("Saved updated parameters to logs/trained_params.json");
}
