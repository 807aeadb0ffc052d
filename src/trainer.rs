use std::thread;

use argmin::core::{CostFunction, Error, Gradient};
use slog::{info, o, Discard, Drain, Logger};

use crate::clique::LabelSpace;
use crate::config::CrfConfig;
use crate::dataset::{Dataset, DatasetBuilder, EncodedSequence};
use crate::errors::{CrfError, Result};
use crate::features::{collect_known_lc_words, FeatureTemplates};
use crate::forward_backward::CliqueTree;
use crate::model::{prune_rows, Model};
use crate::optimizers::lbfgs;
use crate::optimizers::SurpriseConvergence;
use crate::token::Token;
use crate::vector::{GradientVector, WeightLayout};
use crate::vocab::Vocabulary;

fn to_argmin_error(error: CrfError) -> Error {
    match error {
        CrfError::NumericalInstability(e) => SurpriseConvergence(e.to_string()).into(),
        e => Error::msg(e.to_string()),
    }
}

/// Adds expected minus empirical window counts of one sequence.
fn update_gradient<G>(
    sequence: &EncodedSequence,
    tree: &CliqueTree,
    label_space: &LabelSpace,
    layout: &WeightLayout,
    gradients: &mut G,
) where
    G: GradientVector + ?Sized,
{
    let background = label_space.background();
    for (pos, by_order) in sequence.features.iter().enumerate() {
        for (order, ids) in by_order.iter().enumerate() {
            if ids.is_empty() {
                continue;
            }
            let expected = tree.window_marginals(pos, order, label_space);
            let gold = LabelSpace::window_at(&sequence.labels, pos, order, background);
            let gold = label_space.window_index(&gold.0);
            for &f in ids {
                let start = layout.row(f).start;
                for (w, &p) in expected.iter().enumerate() {
                    if p != 0.0 {
                        gradients.add(start + w, p);
                    }
                }
                if let Some(w) = gold {
                    gradients.add(start + w as usize, -1.0);
                }
            }
        }
    }
}

/// Negative conditional log-likelihood of a dataset with an L2 penalty.
pub struct CrfLoss<'a> {
    dataset: &'a Dataset,
    label_space: &'a LabelSpace,
    layout: &'a WeightLayout,
    n_threads: usize,
    l2_lambda: f64,
}

impl<'a> CrfLoss<'a> {
    /// Creates an objective. Weights are laid out by `layout`.
    pub fn new(
        dataset: &'a Dataset,
        label_space: &'a LabelSpace,
        layout: &'a WeightLayout,
        n_threads: usize,
        l2_lambda: f64,
    ) -> Self {
        Self {
            dataset,
            label_space,
            layout,
            n_threads: n_threads.max(1),
            l2_lambda,
        }
    }

    /// Runs `f` over every sequence on `n_threads` threads, each folding
    /// into its own accumulator.
    fn map_sequences<T, F>(&self, init: T, f: F) -> Result<Vec<T>>
    where
        T: Clone + Send,
        F: Fn(&mut T, &EncodedSequence) -> Result<()> + Sync,
    {
        let (s, r) = crossbeam_channel::unbounded();
        for sequence in self.dataset.sequences() {
            s.send(sequence).unwrap();
        }
        drop(s);
        thread::scope(|scope| {
            let mut threads = vec![];
            for _ in 0..self.n_threads {
                let r = r.clone();
                let f = &f;
                let mut acc = init.clone();
                let t = scope.spawn(move || -> Result<T> {
                    while let Ok(sequence) = r.recv() {
                        f(&mut acc, sequence)?;
                    }
                    Ok(acc)
                });
                threads.push(t);
            }
            let mut results = vec![];
            for t in threads {
                match t.join() {
                    Ok(acc) => results.push(acc?),
                    Err(e) => std::panic::resume_unwind(e),
                }
            }
            Ok(results)
        })
    }
}

impl CostFunction for CrfLoss<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, Error> {
        let weights = self.layout.view(param);
        let losses = self
            .map_sequences(0.0, |loss, sequence| {
                let tree = CliqueTree::calibrate(sequence, &weights, self.label_space)?;
                *loss += tree.log_z() - tree.total_score(&sequence.labels);
                Ok(())
            })
            .map_err(to_argmin_error)?;
        let mut loss_total: f64 = losses.into_iter().sum();

        let norm2: f64 = param.iter().map(|p| p * p).sum();
        loss_total += self.l2_lambda * norm2 * 0.5;
        if !loss_total.is_finite() {
            return Err(SurpriseConvergence(format!("objective is {loss_total}")).into());
        }
        Ok(loss_total)
    }
}

impl Gradient for CrfLoss<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, param: &Self::Param) -> Result<Self::Gradient, Error> {
        let weights = self.layout.view(param);
        let partials = self
            .map_sequences(vec![0.0; param.len()], |gradients, sequence| {
                let tree = CliqueTree::calibrate(sequence, &weights, self.label_space)?;
                update_gradient(sequence, &tree, self.label_space, self.layout, gradients);
                Ok(())
            })
            .map_err(to_argmin_error)?;
        let mut gradients = vec![0.0; param.len()];
        for partial in partials {
            for (y, x) in gradients.iter_mut().zip(partial) {
                *y += x;
            }
        }
        for (g, p) in gradients.iter_mut().zip(param) {
            *g += self.l2_lambda * *p;
        }
        Ok(gradients)
    }
}

/// Trainer for clique CRFs.
#[cfg_attr(docsrs, doc(cfg(feature = "train")))]
pub struct Trainer {
    max_iter: Option<u64>,
    tolerance: f64,
    memory: usize,
    l2_lambda: f64,
    n_threads: usize,
    prune_times: usize,
    prune_threshold: f64,
    verbose: bool,
}

impl Trainer {
    /// Creates a new trainer.
    pub fn new() -> Self {
        Self {
            max_iter: None,
            tolerance: 1e-4,
            memory: 25,
            l2_lambda: 1.0,
            n_threads: 1,
            prune_times: 0,
            prune_threshold: 0.0,
            verbose: false,
        }
    }

    /// Sets the maximum number of iterations of each optimization run.
    /// `None` runs until convergence.
    pub fn max_iter(mut self, max_iter: Option<u64>) -> Result<Self> {
        if max_iter == Some(0) {
            return Err(CrfError::invalid_argument("max_iter", "must not be 0"));
        }
        self.max_iter = max_iter;
        Ok(self)
    }

    /// Sets the relative improvement below which optimization stops.
    pub fn tolerance(mut self, tolerance: f64) -> Result<Self> {
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(CrfError::invalid_argument(
                "tolerance",
                "must be a positive finite number",
            ));
        }
        self.tolerance = tolerance;
        Ok(self)
    }

    /// Sets the number of correction pairs kept by L-BFGS.
    pub fn memory(mut self, memory: usize) -> Result<Self> {
        if memory == 0 {
            return Err(CrfError::invalid_argument("memory", "must not be 0"));
        }
        self.memory = memory;
        Ok(self)
    }

    /// Sets the L2-regularization coefficient.
    pub fn l2_lambda(mut self, l2_lambda: f64) -> Result<Self> {
        if !(l2_lambda.is_finite() && l2_lambda >= 0.0) {
            return Err(CrfError::invalid_argument(
                "l2_lambda",
                "must be greater than or equal to 0.0",
            ));
        }
        self.l2_lambda = l2_lambda;
        Ok(self)
    }

    /// Sets the number of threads.
    pub fn n_threads(mut self, n_threads: usize) -> Result<Self> {
        if n_threads == 0 {
            return Err(CrfError::invalid_argument("n_threads", "must not be 0"));
        }
        self.n_threads = n_threads;
        Ok(self)
    }

    /// Retrains up to `times` more times, each time after dropping the
    /// features whose weight range is below `threshold`.
    pub fn prune(mut self, times: usize, threshold: f64) -> Result<Self> {
        if !(threshold >= 0.0) {
            return Err(CrfError::invalid_argument(
                "threshold",
                "must be greater than or equal to 0.0",
            ));
        }
        self.prune_times = times;
        self.prune_threshold = threshold;
        Ok(self)
    }

    /// Prints progress to the terminal.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn logger(&self) -> Logger {
        if self.verbose {
            let decorator = slog_term::TermDecorator::new().build();
            let drain = slog_term::FullFormat::new(decorator).build().fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            Logger::root(drain, o!("module" => "trainer"))
        } else {
            Logger::root(Discard, o!())
        }
    }

    /// Trains a model on labeled sentences.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, a token has no label, or the
    /// optimizer stops abnormally.
    pub fn train(&self, corpus: &[Vec<Token>], config: &CrfConfig) -> Result<Model> {
        config.validate()?;
        let logger = self.logger();

        let mut labels = Vocabulary::new();
        labels.add(config.background_symbol.clone());
        for token in corpus.iter().flatten() {
            if let Some(label) = &token.label {
                labels.add(label.clone());
            }
        }
        labels.lock();

        let known_lc_words = collect_known_lc_words(corpus.iter().map(Vec::as_slice));
        let templates = FeatureTemplates::new(
            config.factory,
            config.features.clone(),
            config.window_size,
            known_lc_words,
        );
        let mut builder = DatasetBuilder::new(&templates, &labels);
        builder.encode_all(corpus.iter().map(Vec::as_slice))?;
        let (mut features, mut dataset) = builder.finish();
        let label_space = LabelSpace::from_sequences(
            labels.len(),
            config.window_size,
            0,
            dataset.sequences().iter().map(|s| s.labels.as_slice()),
        )?;
        dataset.validate(&label_space, features.len())?;
        info!(logger, "encoded corpus";
            "sentences" => dataset.len(),
            "labels" => labels.len(),
            "features" => features.len(),
        );

        let mut layout = WeightLayout::new(&features, &label_space);
        let mut init = vec![0.0; layout.len()];
        let mut round = 0;
        loop {
            let loss = CrfLoss::new(
                &dataset,
                &label_space,
                &layout,
                self.n_threads,
                self.l2_lambda,
            );
            let result = lbfgs::optimize(
                loss,
                init,
                self.memory,
                self.tolerance,
                self.max_iter,
                self.verbose,
            )?;
            info!(logger, "optimization finished";
                "round" => round,
                "iterations" => result.iterations,
                "converged" => result.converged,
                "parameters" => layout.len(),
            );
            let weights = layout.unflatten(&result.weights);
            if round == self.prune_times {
                return Model::new(labels, features, label_space, config.clone(), weights, templates);
            }
            round += 1;

            let (survivors, kept, removed) = prune_rows(&features, &weights, self.prune_threshold);
            info!(logger, "pruned features"; "removed" => removed, "kept" => survivors.len());
            if removed == 0 {
                return Model::new(labels, features, label_space, config.clone(), weights, templates);
            }
            features = survivors;
            dataset =
                Dataset::encode_parallel(&templates, &features, &labels, corpus, self.n_threads)?;
            dataset.validate(&label_space, features.len())?;
            layout = WeightLayout::new(&features, &label_space);
            init = layout.flatten(&kept);
        }
    }
}

impl Default for Trainer {
    fn default() -> Self {
        Self::new()
    }
}
