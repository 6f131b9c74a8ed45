use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;

use nativednn::{logging, FunctionType, ModelOptions, NativeModel};

#[derive(Parser, Debug)]
#[command(name = "nativednn-inspect", version, about = "Print the layer and operand tables of a native DNN model")]
struct Cli {
    /// Path to the model file
    model: PathBuf,

    /// Print JSON instead of tables
    #[arg(long)]
    json: bool,

    /// Probe the output size for an input of WIDTHxHEIGHT
    #[arg(long, value_name = "WIDTHxHEIGHT", requires_all = ["input", "output"])]
    probe: Option<String>,

    /// Input operand used by --probe
    #[arg(long)]
    input: Option<String>,

    /// Output operand used by --probe
    #[arg(long)]
    output: Option<String>,
}

#[derive(Serialize)]
struct Summary {
    minor_version: i32,
    layers: Vec<LayerRow>,
    operands: Vec<OperandRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    probe: Option<[usize; 2]>,
}

#[derive(Serialize)]
struct LayerRow {
    index: usize,
    kind: String,
    inputs: Vec<usize>,
    output: usize,
}

#[derive(Serialize)]
struct OperandRow {
    index: usize,
    name: String,
    kind: String,
    data_type: String,
    dims: [i32; 4],
}

fn parse_size(text: &str) -> Result<(usize, usize)> {
    let (width, height) = text
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("expected WIDTHxHEIGHT, got {}", text))?;
    Ok((
        width.trim().parse().with_context(|| format!("bad width in {}", text))?,
        height.trim().parse().with_context(|| format!("bad height in {}", text))?,
    ))
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    let options = ModelOptions::sync().with_nireq(1);
    let model = NativeModel::load(&cli.model, FunctionType::Process, options)
        .with_context(|| format!("load {}", cli.model.display()))?;

    let probe = match (&cli.probe, &cli.input, &cli.output) {
        (Some(size), Some(input), Some(output)) => {
            let (width, height) = parse_size(size)?;
            let (out_width, out_height) = model.get_output(input, width, height, output)?;
            Some([out_width, out_height])
        }
        _ => None,
    };

    let summary = Summary {
        minor_version: model.minor_version(),
        layers: model
            .layers()
            .iter()
            .enumerate()
            .map(|(index, layer)| LayerRow {
                index,
                kind: layer.kind().to_string(),
                inputs: layer.input_operand_indexes.clone(),
                output: layer.output_operand_index,
            })
            .collect(),
        operands: model
            .operands()
            .iter()
            .enumerate()
            .map(|(index, operand)| OperandRow {
                index,
                name: operand.name.clone(),
                kind: format!("{:?}", operand.kind).to_lowercase(),
                data_type: operand.data_type.to_string(),
                dims: operand.dims,
            })
            .collect(),
        probe,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("model {} (minor version {})", cli.model.display(), summary.minor_version);
    println!("layers:");
    for layer in &summary.layers {
        println!("  [{:>3}] {:<15} {:?} -> {}", layer.index, layer.kind, layer.inputs, layer.output);
    }
    println!("operands:");
    for operand in &summary.operands {
        println!(
            "  [{:>3}] {:<24} {:<12} {:<6} {:?}",
            operand.index, operand.name, operand.kind, operand.data_type, operand.dims
        );
    }
    if let Some([width, height]) = summary.probe {
        println!("probe: output is {}x{}", width, height);
    }
    Ok(())
}
