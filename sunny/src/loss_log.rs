use crate::sunny_common::*;

use anyhow::{anyhow, Context};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};

/// Write one `{train}   {val}` line per epoch. An existing file is
/// replaced.
pub fn write_loss_log(epoch_loss: &EpochLoss, log_file: &Path) -> anyhow::Result<()> {
    if log_file.exists() {
        warn!("overwriting the loss log: {}", log_file.display());
    }

    let file = File::create(log_file)
        .with_context(|| format!("failed to create {}", log_file.display()))?;
    let mut buf = BufWriter::new(file);

    for (train_loss, val_loss) in epoch_loss.iter() {
        writeln!(buf, "{:?}   {:?}", train_loss, val_loss)?;
    }
    buf.flush()?;

    info!(
        "Wrote {} epochs of losses: {}",
        epoch_loss.len(),
        log_file.display()
    );
    Ok(())
}

/// Read back a loss log written by `write_loss_log`
pub fn read_loss_log(log_file: &Path) -> anyhow::Result<EpochLoss> {
    let file =
        File::open(log_file).with_context(|| format!("failed to open {}", log_file.display()))?;

    let mut train = vec![];
    let mut val = vec![];

    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let words: Vec<&str> = line.split_whitespace().collect();

        if words.len() != 2 {
            return Err(anyhow!(
                "{}:{}: expected two losses, found {:?}",
                log_file.display(),
                i + 1,
                line
            ));
        }
        train.push(words[0].parse::<f32>()?);
        val.push(words[1].parse::<f32>()?);
    }

    EpochLoss::from_traces(train, val)
}
