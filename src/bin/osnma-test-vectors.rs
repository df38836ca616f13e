use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use clap::Parser;
use osnma_receiver::{
    Config, Gst, InavBand, NavigationPage, Osnma, Svn,
    types::{NUM_SVNS, PAGE_BYTES},
};
use std::{fs, path::PathBuf};

/// Run Galileo OSNMA test vectors through the receiver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input CSV file, named after its start time
    /// (for instance 27_JUL_2023_GST_05_00_01.csv)
    input_file: PathBuf,
    /// Directory holding the Merkle tree, public key and KROOT files
    #[arg(long, default_value = ".")]
    exec_path: PathBuf,
    /// Configuration override as key=value (can be repeated)
    #[arg(short = 'c', long = "config", value_parser = parse_pair)]
    config: Vec<(String, String)>,
    /// Stop after this number of pages
    #[arg(long)]
    max_pages: Option<usize>,
}

fn parse_pair(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow::anyhow!("expected key=value, got {s:?}"))?;
    Ok((key.to_string(), value.to_string()))
}

fn filename_to_gst(filename: &str) -> Result<Gst> {
    let dt = NaiveDateTime::parse_from_str(filename, "%d_%b_%Y_GST_%H_%M_%S.csv")?;
    let t = dt.and_utc().timestamp();
    let gst_epoch_t = 935280000; // 1999-08-22 00:00:00 GST
    let gst_seconds = t - gst_epoch_t;
    const SECS_IN_WEEK: i64 = 24 * 3600 * 7;
    let wn = gst_seconds / SECS_IN_WEEK;
    let tow = gst_seconds - wn * SECS_IN_WEEK;
    Gst::try_new(
        (wn % 4096).try_into()?,
        tow.try_into()?,
    )
    .ok_or_else(|| anyhow::anyhow!("invalid start time {filename}"))
}

// One CSV row holds all the pages of a satellite, starting at `start_gst`
fn csv_line_to_pages(line: &str, start_gst: Gst) -> Result<Vec<NavigationPage>> {
    let mut fields = line.split(',');
    let wrong_format = || anyhow::anyhow!("CSV has wrong format");
    let svn: u8 = fields.next().ok_or_else(wrong_format)?.trim().parse()?;
    let svn = Svn::try_from(svn)?;
    // skip length CSV field
    fields.next().ok_or_else(wrong_format)?;
    let data = hex::decode(fields.next().ok_or_else(wrong_format)?.trim())?;
    if data.len() % PAGE_BYTES != 0 {
        return Err(wrong_format());
    }
    let mut gst = start_gst;
    Ok(data
        .chunks_exact(PAGE_BYTES)
        .map(|chunk| {
            let mut nav_bits = [0; PAGE_BYTES];
            nav_bits.copy_from_slice(chunk);
            let page = NavigationPage {
                svn,
                gst,
                nav_bits,
                band: InavBand::E1B,
                // Test vectors are free of bit errors
                crc_ok: true,
            };
            gst = gst.add_seconds(2);
            page
        })
        .collect())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let filename = args
        .input_file
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("input path does not contain a filename"))?
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("input filename does not contain valid UTF-8"))?;
    let start_gst = filename_to_gst(filename)?;

    let exec_path = args
        .exec_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("exec path does not contain valid UTF-8"))?
        .to_string();
    let pairs = std::iter::once(("exec_path".to_string(), exec_path)).chain(args.config);
    let config = Config::from_pairs(pairs)?;
    let mut osnma = Osnma::new(config).context("could not load key material")?;

    let csv = fs::read_to_string(&args.input_file)
        .with_context(|| format!("could not read {}", args.input_file.display()))?;
    let mut csv = csv.lines();
    // discard csv header
    csv.next()
        .ok_or_else(|| anyhow::anyhow!("input file is empty"))?;
    let mut pages = Vec::with_capacity(NUM_SVNS);
    for line in csv.filter(|l| !l.trim().is_empty()) {
        pages.push(csv_line_to_pages(line, start_gst)?);
    }

    // Interleave the satellites page by page
    let longest = pages.iter().map(Vec::len).max().unwrap_or(0);
    let stream = (0..longest).flat_map(|n| pages.iter().filter_map(move |p| p.get(n).copied()));
    let summary = osnma.run(stream, args.max_pages)?;

    log::info!("processed {} pages", summary.pages);
    match osnma.first_fix() {
        Some(fix) => log::info!(
            "first authenticated fix at {} (TTFAF = {} s from {})",
            fix.fix_gst,
            fix.ttfaf,
            fix.first_gst
        ),
        None => log::info!("no authenticated fix"),
    }
    for svn in Svn::iter() {
        if let Some(ced) = osnma.get_ced_and_status(svn) {
            log::info!(
                "{svn} authenticated CED IODnav {} ({} bits) at {}",
                ced.iod,
                ced.auth_bits,
                ced.gst
            );
        }
        if let Some(timing) = osnma.get_timing_parameters(svn) {
            log::info!(
                "{svn} authenticated timing parameters ({} bits) at {}",
                timing.auth_bits,
                timing.gst
            );
        }
    }
    Ok(())
}
