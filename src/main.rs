use anyhow::{anyhow, Result};
use cell_dataset::image_ops::{draw_boxes, tensor_to_rgb_image};
use cell_dataset::options::DatasetOptions;
use cell_dataset::{measure_time, Batch, DEVICE};
use clap::{crate_version, App, Arg};
use log::{info, warn};
use std::fs;
use std::path::Path;

fn main() -> Result<()> {
    log4rs::init_file("log4rs.yml", Default::default())?;

    let matches = App::new("cell-dataset")
        .version(crate_version!())
        .about("Loads augmented cell image samples listed in a labels manifest")
        .arg(
            Arg::with_name("manifest")
                .help("Exported labels JSON")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("start")
                .long("start")
                .takes_value(true)
                .help("First sample index"),
        )
        .arg(
            Arg::with_name("count")
                .long("count")
                .short("n")
                .takes_value(true)
                .help("Number of samples to load (defaults to all)"),
        )
        .arg(
            Arg::with_name("batch-size")
                .long("batch-size")
                .short("b")
                .takes_value(true),
        )
        .arg(Arg::with_name("shuffle").long("shuffle"))
        .arg(Arg::with_name("seed").long("seed").takes_value(true))
        .arg(
            Arg::with_name("timeout")
                .long("timeout")
                .takes_value(true)
                .help("Request timeout in seconds, 0 waits forever"),
        )
        .arg(
            Arg::with_name("cache")
                .long("cache")
                .help("Keep decoded images in memory between accesses"),
        )
        .arg(
            Arg::with_name("strict-masks")
                .long("strict-masks")
                .help("Fail on masks whose color channels differ"),
        )
        .arg(
            Arg::with_name("resize")
                .long("resize")
                .takes_value(true)
                .help("Frame every image is resized to, WIDTHxHEIGHT"),
        )
        .arg(
            Arg::with_name("crop")
                .long("crop")
                .takes_value(true)
                .help("Random crop window, WIDTHxHEIGHT"),
        )
        .arg(Arg::with_name("hflip-prob").long("hflip-prob").takes_value(true))
        .arg(Arg::with_name("vflip-prob").long("vflip-prob").takes_value(true))
        .arg(
            Arg::with_name("output-dir")
                .long("output-dir")
                .short("o")
                .takes_value(true)
                .help("Writes every augmented image with its boxes drawn on top"),
        )
        .get_matches();

    let opts = DatasetOptions::new(&matches)?;
    run(&opts)
}

fn run(opts: &DatasetOptions) -> Result<()> {
    let dataset = measure_time!(
        "building dataset",
        || opts.build_dataset(),
        log::Level::Info
    )?;
    if dataset.is_empty() {
        return Err(anyhow!("Manifest {} has no entries", opts.manifest_path));
    }
    if let Some(dir) = opts.output_dir {
        fs::create_dir_all(dir)?;
    }

    let indices = opts.indices(dataset.len());
    info!(
        "Loading {} of {} samples in batches of {}",
        indices.len(),
        dataset.len(),
        opts.batch_size
    );
    let mut batches = dataset.batches_over(indices, opts.batch_size);
    if let Some(seed) = opts.seed {
        batches.seed(seed);
    }
    if opts.shuffle {
        batches.shuffle();
    }
    batches.return_smaller_last_batch().to_device(*DEVICE);

    let mut total_instances = 0;
    for batch in &mut batches {
        let batch = batch?;
        total_instances += batch.total_instances();
        for (index, (image, target)) in batch
            .indices
            .iter()
            .zip(batch.images.iter().zip(batch.targets.iter()))
        {
            let entry = dataset.manifest().get(*index)?;
            info!(
                "sample {} ({}): image {:?}, {} instances",
                index,
                entry.display_name(),
                image.size(),
                target.num_instances()
            );
            if target.num_instances() == 0 {
                warn!("sample {} has no instance inside the crop window", index);
            }
        }
        if let Some(dir) = opts.output_dir {
            save_overlays(&batch, Path::new(dir))?;
        }
    }
    info!("Done, {} instances in total", total_instances);
    Ok(())
}

fn save_overlays(batch: &Batch, dir: &Path) -> Result<()> {
    for ((index, image), target) in batch
        .indices
        .iter()
        .zip(batch.images.iter())
        .zip(batch.targets.iter())
    {
        let mut overlay = tensor_to_rgb_image(&image.to_device(tch::Device::Cpu))?;
        draw_boxes(&mut overlay, &target.boxes.to_device(tch::Device::Cpu))?;
        let path = dir.join(format!("{:05}.png", index));
        overlay.save(&path)?;
    }
    Ok(())
}
