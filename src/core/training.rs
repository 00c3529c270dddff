//! Training infrastructure for Hamiltonian models

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{HnnError, Result};

/// Paired inputs and targets, one sample per row
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    x: Array2<f64>,
    y: Array2<f64>,
}

impl Dataset {
    /// Pair `x` with `y`; both must have the same number of rows.
    pub fn new(x: Array2<f64>, y: Array2<f64>) -> Result<Self> {
        if x.nrows() != y.nrows() {
            return Err(HnnError::InvalidInputShape(format!(
                "inputs have {} rows but targets have {}",
                x.nrows(),
                y.nrows()
            )));
        }
        Ok(Dataset { x, y })
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    /// Check if the dataset has no samples
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inputs
    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    /// Targets
    pub fn y(&self) -> &Array2<f64> {
        &self.y
    }

    /// Rows at `indices`, in that order
    pub fn select(&self, indices: &[usize]) -> Dataset {
        Dataset {
            x: self.x.select(Axis(0), indices),
            y: self.y.select(Axis(0), indices),
        }
    }

    /// Split into train and validation sets.
    ///
    /// The last `floor(len * val_ratio)` samples (after the optional seeded
    /// shuffle) form the validation set.
    pub fn split(
        &self,
        val_ratio: f64,
        shuffle: bool,
        seed: Option<u64>,
    ) -> Result<(Dataset, Dataset)> {
        if !(0.0..1.0).contains(&val_ratio) {
            return Err(HnnError::InvalidConfig(format!(
                "validation split must be in [0, 1), got {}",
                val_ratio
            )));
        }

        let mut indices: Vec<usize> = (0..self.len()).collect();
        if shuffle {
            indices.shuffle(&mut seeded_rng(seed));
        }

        let val_size = (self.len() as f64 * val_ratio) as usize;
        let train_size = self.len() - val_size;

        Ok((
            self.select(&indices[..train_size]),
            self.select(&indices[train_size..]),
        ))
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Training configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Random seed for shuffling
    pub seed: Option<u64>,
    /// Train/validation split ratio
    pub validation_split: f64,
    /// Whether to shuffle data
    pub shuffle: bool,
    /// Stop after this many epochs without improvement
    pub early_stopping_patience: Option<usize>,
    /// Checkpoint frequency (epochs)
    pub checkpoint_every: Option<usize>,
    /// Directory for checkpoint files
    pub checkpoint_dir: PathBuf,
    /// Log epoch losses every this many epochs; 0 logs only the summary
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            seed: Some(42),
            validation_split: 0.2,
            shuffle: true,
            early_stopping_patience: None,
            checkpoint_every: None,
            checkpoint_dir: PathBuf::from("."),
            log_every: 10,
        }
    }
}

/// Training metrics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Mean training loss per epoch
    pub train_loss: Vec<f64>,
    /// Validation loss per epoch; empty without a validation set
    pub val_loss: Vec<f64>,
    /// Best monitored loss (validation if present, training otherwise)
    pub best_val_loss: f64,
    /// Epoch with the best monitored loss
    pub best_epoch: usize,
    /// Total training time
    pub total_time: Duration,
}

impl TrainingMetrics {
    /// Create new metrics tracker
    pub fn new() -> Self {
        TrainingMetrics {
            train_loss: Vec::new(),
            val_loss: Vec::new(),
            best_val_loss: f64::INFINITY,
            best_epoch: 0,
            total_time: Duration::from_secs(0),
        }
    }

    /// Update metrics for an epoch
    pub fn update_epoch(&mut self, epoch: usize, train_loss: f64, val_loss: Option<f64>) {
        self.train_loss.push(train_loss);
        if let Some(val) = val_loss {
            self.val_loss.push(val);
        }

        let monitored = val_loss.unwrap_or(train_loss);
        if monitored < self.best_val_loss {
            self.best_val_loss = monitored;
            self.best_epoch = epoch;
        }
    }

    /// Epochs recorded since the best one
    pub fn epochs_without_improvement(&self) -> usize {
        self.train_loss.len().saturating_sub(self.best_epoch + 1)
    }

    /// Check if should stop early: at least `patience` epochs in a row have
    /// failed to improve on the best monitored loss. Never true on an epoch
    /// that set a new best.
    pub fn should_stop_early(&self, patience: usize) -> bool {
        let stale = self.epochs_without_improvement();
        stale > 0 && stale >= patience
    }

    /// Number of epochs recorded
    pub fn epochs(&self) -> usize {
        self.train_loss.len()
    }

    /// Get summary statistics
    pub fn summary(&self) -> String {
        format!(
            "Best validation loss: {:.6} at epoch {}\nTotal training time: {:.2}s\nFinal train loss: {:.6}\nFinal val loss: {:.6}",
            self.best_val_loss,
            self.best_epoch,
            self.total_time.as_secs_f32(),
            self.train_loss.last().unwrap_or(&0.0),
            self.val_loss.last().unwrap_or(&0.0)
        )
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A model the [`fit`] loop can drive
pub trait TrainableModel {
    /// One optimization step on a batch; returns the batch loss
    fn train_batch(&mut self, batch: &Dataset) -> Result<f64>;

    /// Loss on a batch without updating parameters
    fn evaluate_batch(&self, batch: &Dataset) -> Result<f64>;

    /// Save model checkpoint
    fn save_checkpoint(&self, path: &Path) -> Result<()>;
}

/// Data loader for batching.
///
/// Yields batches of row indices; combine with [`Dataset::select`].
pub struct DataLoader {
    indices: Vec<usize>,
    batch_size: usize,
    shuffle: bool,
    current_idx: usize,
    rng: StdRng,
}

impl DataLoader {
    /// Create new data loader over `len` samples
    pub fn new(len: usize, batch_size: usize, shuffle: bool, seed: Option<u64>) -> Self {
        let mut loader = DataLoader {
            indices: (0..len).collect(),
            batch_size: batch_size.max(1),
            shuffle,
            current_idx: 0,
            rng: seeded_rng(seed),
        };

        if shuffle {
            loader.shuffle_data();
        }

        loader
    }

    fn shuffle_data(&mut self) {
        self.indices.shuffle(&mut self.rng);
    }

    /// Reset to beginning
    pub fn reset(&mut self) {
        self.current_idx = 0;
        if self.shuffle {
            self.shuffle_data();
        }
    }

    /// Get next batch
    pub fn next_batch(&mut self) -> Option<Vec<usize>> {
        if self.current_idx >= self.indices.len() {
            return None;
        }

        let end_idx = (self.current_idx + self.batch_size).min(self.indices.len());
        let batch = self.indices[self.current_idx..end_idx].to_vec();
        self.current_idx = end_idx;

        Some(batch)
    }

    /// Get number of batches
    pub fn num_batches(&self) -> usize {
        self.indices.len().div_ceil(self.batch_size)
    }
}

/// Run the epoch loop.
///
/// Splits off a validation set, trains on shuffled mini-batches, writes
/// periodic checkpoints and stops early when the monitored loss has not
/// improved for `early_stopping_patience` epochs. A failed checkpoint is
/// logged and training continues.
pub fn fit<M: TrainableModel + ?Sized>(
    model: &mut M,
    dataset: &Dataset,
    nb_epoch: usize,
    batch_size: usize,
    config: &TrainingConfig,
) -> Result<TrainingMetrics> {
    if batch_size == 0 {
        return Err(HnnError::InvalidConfig(
            "batch size must be positive".to_string(),
        ));
    }

    let (train_data, val_data) = dataset.split(config.validation_split, config.shuffle, config.seed)?;
    if train_data.is_empty() {
        return Err(HnnError::InvalidInputShape(
            "no training samples after the validation split".to_string(),
        ));
    }

    info!(
        train = train_data.len(),
        validation = val_data.len(),
        nb_epoch,
        batch_size,
        "starting training"
    );

    let mut metrics = TrainingMetrics::new();
    let start_time = Instant::now();
    let mut loader = DataLoader::new(train_data.len(), batch_size, config.shuffle, config.seed);

    for epoch in 0..nb_epoch {
        loader.reset();
        let mut epoch_loss = 0.0;
        let mut num_batches = 0usize;

        while let Some(indices) = loader.next_batch() {
            let batch = train_data.select(&indices);
            let batch_loss = model.train_batch(&batch)?;
            debug!(epoch, batch = num_batches, loss = batch_loss, "batch");
            epoch_loss += batch_loss;
            num_batches += 1;
        }

        let avg_train_loss = epoch_loss / num_batches as f64;
        let val_loss = if val_data.is_empty() {
            None
        } else {
            Some(model.evaluate_batch(&val_data)?)
        };

        metrics.update_epoch(epoch, avg_train_loss, val_loss);

        if config.log_every > 0 && (epoch + 1) % config.log_every == 0 {
            info!(
                epoch = epoch + 1,
                nb_epoch,
                train_loss = avg_train_loss,
                val_loss = val_loss.unwrap_or(f64::NAN),
                "epoch finished"
            );
        }

        if let Some(freq) = config.checkpoint_every.filter(|&f| f > 0) {
            if (epoch + 1) % freq == 0 {
                let path = config
                    .checkpoint_dir
                    .join(format!("checkpoint_epoch_{}.json", epoch + 1));
                match model.save_checkpoint(&path) {
                    Ok(()) => debug!(path = %path.display(), "saved checkpoint"),
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to save checkpoint"),
                }
            }
        }

        if let Some(patience) = config.early_stopping_patience {
            if metrics.should_stop_early(patience) {
                info!(epoch = epoch + 1, best_epoch = metrics.best_epoch, "early stopping");
                break;
            }
        }
    }

    metrics.total_time = start_time.elapsed();
    info!(
        best_loss = metrics.best_val_loss,
        best_epoch = metrics.best_epoch,
        seconds = metrics.total_time.as_secs_f64(),
        "training complete"
    );

    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;
    use std::cell::{Cell, RefCell};

    fn toy_dataset(n: usize) -> Dataset {
        let x = Array::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f64);
        let y = Array::from_shape_fn((n, 1), |(i, _)| i as f64);
        Dataset::new(x, y).unwrap()
    }

    #[test]
    fn test_data_loader() {
        let mut loader = DataLoader::new(5, 2, false, None);

        assert_eq!(loader.num_batches(), 3);
        assert_eq!(loader.next_batch().unwrap(), vec![0, 1]);
        assert_eq!(loader.next_batch().unwrap(), vec![2, 3]);
        assert_eq!(loader.next_batch().unwrap(), vec![4]);
        assert!(loader.next_batch().is_none());

        loader.reset();
        assert_eq!(loader.next_batch().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_data_loader_shuffle_covers_all_rows() {
        let mut loader = DataLoader::new(10, 3, true, Some(5));
        let mut seen = Vec::new();
        while let Some(batch) = loader.next_batch() {
            seen.extend(batch);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_dataset_rejects_mismatched_rows() {
        let x = Array2::<f64>::zeros((3, 2));
        let y = Array2::<f64>::zeros((4, 2));
        assert!(matches!(
            Dataset::new(x, y),
            Err(HnnError::InvalidInputShape(_))
        ));
    }

    #[test]
    fn test_split() {
        let data = toy_dataset(10);
        let (train, val) = data.split(0.2, false, None).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(val.len(), 2);
        assert_eq!(val.y()[[0, 0]], 8.0);

        let (a, _) = data.split(0.3, true, Some(1)).unwrap();
        let (b, _) = data.split(0.3, true, Some(1)).unwrap();
        assert_eq!(a, b);

        assert!(data.split(1.0, false, None).is_err());
    }

    #[test]
    fn test_metrics() {
        let mut metrics = TrainingMetrics::new();

        metrics.update_epoch(0, 1.0, Some(0.9));
        metrics.update_epoch(1, 0.8, Some(0.7));
        metrics.update_epoch(2, 0.6, Some(0.8));

        assert_eq!(metrics.best_epoch, 1);
        assert_eq!(metrics.best_val_loss, 0.7);
        assert!(metrics.should_stop_early(1)); // patience=1, current=3, best=1
        assert!(!metrics.should_stop_early(2));
    }

    #[test]
    fn test_zero_patience_waits_for_a_stale_epoch() {
        let mut metrics = TrainingMetrics::new();
        for epoch in 0..5 {
            metrics.update_epoch(epoch, 1.0 / (epoch + 1) as f64, None);
            assert!(!metrics.should_stop_early(0));
        }
        metrics.update_epoch(5, 1.0, None);
        assert_eq!(metrics.epochs_without_improvement(), 1);
        assert!(metrics.should_stop_early(0));
        assert!(metrics.should_stop_early(1));
        assert!(!metrics.should_stop_early(2));
    }

    #[test]
    fn test_metrics_without_validation() {
        let mut metrics = TrainingMetrics::default();
        metrics.update_epoch(0, 2.0, None);
        metrics.update_epoch(1, 1.0, None);
        assert!(metrics.val_loss.is_empty());
        assert_eq!(metrics.best_epoch, 1);
        assert_eq!(metrics.epochs(), 2);
    }

    /// Reports a fixed loss and records what the loop asks of it.
    struct Recorder {
        loss: f64,
        batches: usize,
        seen_rows: usize,
        checkpoints: RefCell<Vec<PathBuf>>,
    }

    impl Recorder {
        fn new(loss: f64) -> Self {
            Recorder {
                loss,
                batches: 0,
                seen_rows: 0,
                checkpoints: RefCell::new(Vec::new()),
            }
        }
    }

    impl TrainableModel for Recorder {
        fn train_batch(&mut self, batch: &Dataset) -> Result<f64> {
            self.batches += 1;
            self.seen_rows += batch.len();
            Ok(self.loss)
        }

        fn evaluate_batch(&self, _batch: &Dataset) -> Result<f64> {
            Ok(self.loss)
        }

        fn save_checkpoint(&self, path: &Path) -> Result<()> {
            self.checkpoints.borrow_mut().push(path.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn test_fit_runs_every_batch() {
        let mut model = Recorder::new(1.0);
        let config = TrainingConfig {
            validation_split: 0.0,
            checkpoint_every: Some(2),
            checkpoint_dir: PathBuf::from("ckpt"),
            ..TrainingConfig::default()
        };
        let metrics = fit(&mut model, &toy_dataset(10), 4, 4, &config).unwrap();

        assert_eq!(metrics.epochs(), 4);
        assert!(metrics.val_loss.is_empty());
        assert_eq!(model.batches, 12);
        assert_eq!(model.seen_rows, 40);
        assert_eq!(
            *model.checkpoints.borrow(),
            vec![
                PathBuf::from("ckpt/checkpoint_epoch_2.json"),
                PathBuf::from("ckpt/checkpoint_epoch_4.json"),
            ]
        );
    }

    #[test]
    fn test_fit_stops_early_on_plateau() {
        // constant loss: best stays at epoch 0
        let mut model = Recorder::new(0.5);
        let config = TrainingConfig {
            early_stopping_patience: Some(2),
            ..TrainingConfig::default()
        };
        let metrics = fit(&mut model, &toy_dataset(10), 50, 5, &config).unwrap();

        assert_eq!(metrics.best_epoch, 0);
        assert_eq!(metrics.epochs(), 3);
        assert_eq!(metrics.val_loss.len(), 3);
    }

    /// Loss `1/n` on the n-th call, so every epoch improves.
    struct Descending {
        calls: Cell<usize>,
    }

    impl Descending {
        fn next_loss(&self) -> f64 {
            self.calls.set(self.calls.get() + 1);
            1.0 / self.calls.get() as f64
        }
    }

    impl TrainableModel for Descending {
        fn train_batch(&mut self, _batch: &Dataset) -> Result<f64> {
            Ok(self.next_loss())
        }

        fn evaluate_batch(&self, _batch: &Dataset) -> Result<f64> {
            Ok(self.next_loss())
        }

        fn save_checkpoint(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_zero_patience_keeps_improving_run() {
        let mut model = Descending { calls: Cell::new(0) };
        let config = TrainingConfig {
            early_stopping_patience: Some(0),
            ..TrainingConfig::default()
        };
        let metrics = fit(&mut model, &toy_dataset(10), 10, 5, &config).unwrap();

        assert_eq!(metrics.epochs(), 10);
        assert_eq!(metrics.best_epoch, 9);
    }

    #[test]
    fn test_fit_rejects_zero_batch_size() {
        let mut model = Recorder::new(1.0);
        assert!(fit(&mut model, &toy_dataset(4), 1, 0, &TrainingConfig::default()).is_err());
    }
}
