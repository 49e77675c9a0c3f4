//! The training driver.
//!
//! One run boosts a soft cascade over every window the detector would
//! scan across the labeled image set. The window population lives
//! out-of-core: cumulative scores in the disk-paged buffer, membership
//! labels as run-length streams, and only a bounded example pool in
//! memory. Negatives in the pool are periodically thrown away and
//! resampled from the full population ("remasking") so boosting keeps
//! seeing the hard negatives that survive the current cascade.

use colored::Colorize;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cascade::{Cascade, Stage};
use crate::codec::{encode, Run, RunDecoder, WindowLabel};
use crate::constants::{MAX_NUM_SCALE, MAX_SCORE, MIN_SCORE, NUM_HIST_BIN};
use crate::errors::{Error, Result};
use crate::feature::{Feature, FeatureBank, RectFeature};
use crate::image::NormIntegral;
use crate::labels::{read_label_file, ImageInfo};
use super::config::TrainConfig;
use super::example::{ImageSource, TrainExample};
use super::pager::ScorePager;
use super::sampling::importance_sample;
use super::selection::select_feature;
use super::thresholds::{build_stage_table, find_thresholds};
use super::windows::{label_windows, scan_windows, ScanWindow};

/// One image of the training set, with its window-label stream and its
/// slice of the global score buffer.
struct PoolImage {
    info: ImageInfo,
    runs: Vec<Run>,
    offset: usize,
    n_windows: usize,
}

/// Replays the window population image by image while a score-buffer
/// pass walks the global index in ascending order.
struct ImageCursor<'a, S: ImageSource> {
    images: &'a [PoolImage],
    source: &'a S,
    config: &'a TrainConfig,
    next: usize,
    loaded: Option<LoadedImage>,
}

struct LoadedImage {
    integral: NormIntegral,
    windows: Vec<ScanWindow>,
    labels: Vec<WindowLabel>,
    offset: usize,
    end: usize,
}

impl<'a, S: ImageSource> ImageCursor<'a, S> {
    fn new(images: &'a [PoolImage], source: &'a S, config: &'a TrainConfig) -> Self {
        Self { images, source, config, next: 0, loaded: None }
    }

    fn at(&mut self, index: usize) -> Result<(&NormIntegral, ScanWindow, WindowLabel)> {
        loop {
            if let Some(li) = &self.loaded {
                if index >= li.offset && index < li.end {
                    break;
                }
            }
            self.advance(index)?;
        }
        let li = self.loaded.as_ref().unwrap();
        let local = index - li.offset;
        Ok((&li.integral, li.windows[local], li.labels[local]))
    }

    fn advance(&mut self, index: usize) -> Result<()> {
        while self.next < self.images.len() {
            let pi = &self.images[self.next];
            self.next += 1;
            if index < pi.offset + pi.n_windows {
                assert!(index >= pi.offset, "score index visited out of order");
                let gray = self.source.load(&pi.info.path)?;
                let windows = scan_windows(
                    gray.width(),
                    gray.height(),
                    self.config.base_width,
                    self.config.base_height,
                    self.config.step_size,
                    self.config.step_scale,
                );
                assert_eq!(
                    windows.len(),
                    pi.n_windows,
                    "window population changed under the trainer",
                );
                self.loaded = Some(LoadedImage {
                    integral: NormIntegral::from_image(&gray),
                    labels: RunDecoder::new(&pi.runs).collect(),
                    windows,
                    offset: pi.offset,
                    end: pi.offset + pi.n_windows,
                });
                return Ok(());
            }
        }
        panic!("score index {index} beyond the window population");
    }
}

/// Trains a cascade from labeled image folders.
pub struct Trainer {
    config: TrainConfig,
}

impl Trainer {
    pub fn init(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Run the full boosting loop and return the trained cascade. The
    /// cascade file is also rewritten after every round, so an
    /// interrupted run keeps its last completed stage.
    pub fn run(&self, source: &impl ImageSource) -> Result<Cascade> {
        self.config.check()?;
        let mut state = TrainState::setup(&self.config, source)?;
        state.boost(source)?;
        state.finish()
    }
}

struct TrainState<'a> {
    config: &'a TrainConfig,
    bank: Vec<RectFeature>,
    images: Vec<PoolImage>,
    pager: ScorePager,
    pool: Vec<TrainExample>,
    n_pos: usize,
    rng: StdRng,
    cascade: Cascade,
    /// How many leading stages the paged scores already include.
    scored_stages: usize,
}

impl<'a> TrainState<'a> {
    fn setup(config: &'a TrainConfig, source: &impl ImageSource) -> Result<Self> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut bank = FeatureBank::init(config.base_width, config.base_height)
            .min_size(config.min_feature_size, config.min_feature_size)
            .step_fraction(config.feature_step_fraction)
            .scale_step(config.feature_scale_step)
            .random_pairs(config.n_random_features);
        if let Some(seed) = config.seed {
            bank = bank.seed(seed);
        }
        let bank = bank.build();
        println!(
            "{} feature bank holds {} features",
            "[LOG]".bold().green(),
            bank.len(),
        );

        let mut infos: Vec<ImageInfo> = Vec::new();
        for dir in &config.label_dirs {
            let mut batch = read_label_file(dir.join("label.txt"), dir)?;
            for info in &mut batch {
                info.validate();
            }
            infos.extend(batch);
        }

        // first pass: fix the window population and its label streams
        let mut images = Vec::with_capacity(infos.len());
        let mut total = 0usize;
        let mut n_pos_windows = 0usize;
        let mut n_neg_windows = 0usize;
        for info in infos {
            let gray = source.load(&info.path)?;
            let windows = scan_windows(
                gray.width(),
                gray.height(),
                config.base_width,
                config.base_height,
                config.step_size,
                config.step_scale,
            );
            let labels = label_windows(&info, &windows, config.step_size, config.step_scale);
            n_pos_windows += labels.iter().filter(|&&l| l == WindowLabel::Positive).count();
            n_neg_windows += labels.iter().filter(|&&l| l == WindowLabel::Negative).count();
            let n_windows = windows.len();
            images.push(PoolImage {
                info,
                runs: encode(&labels),
                offset: total,
                n_windows,
            });
            total += n_windows;
        }
        println!(
            "{} {} windows over {} images ({} positive, {} negative)",
            "[LOG]".bold().green(),
            total,
            images.len(),
            n_pos_windows,
            n_neg_windows,
        );
        if n_pos_windows == 0 {
            return Err(Error::InvalidConfig(
                "the labeled set contains no positive windows".into(),
            ));
        }
        if n_pos_windows >= config.max_examples {
            return Err(Error::InvalidConfig(format!(
                "{} positive windows exceed the example budget {}",
                n_pos_windows, config.max_examples,
            )));
        }

        let pager = ScorePager::create(
            &config.score_file_prefix,
            config.score_page_size,
            total,
        )?;

        // second pass: fill the pool with every positive and an exact
        // uniform sample of negatives
        let mut pool: Vec<TrainExample> = Vec::with_capacity(config.max_examples);
        let budget = config.max_examples - n_pos_windows;
        let mut neg_left = n_neg_windows;
        let mut quota_left = budget.min(n_neg_windows);
        for pi in &images {
            if pi.n_windows == 0 {
                continue;
            }
            let gray = source.load(&pi.info.path)?;
            let integral = NormIntegral::from_image(&gray);
            let windows = scan_windows(
                gray.width(),
                gray.height(),
                config.base_width,
                config.base_height,
                config.step_size,
                config.step_scale,
            );
            for (local, (w, label)) in windows.iter()
                .zip(RunDecoder::new(&pi.runs))
                .enumerate()
            {
                let label = match label {
                    WindowLabel::Positive => 1,
                    WindowLabel::Negative => {
                        let take = rng.gen_range(0..neg_left) < quota_left;
                        neg_left -= 1;
                        if !take {
                            continue;
                        }
                        quota_left -= 1;
                        -1
                    },
                    WindowLabel::Ignored => continue,
                };
                pool.push(TrainExample::from_window(
                    &integral,
                    &w.rect,
                    w.rung,
                    w.scale,
                    config.base_width,
                    config.base_height,
                    label,
                    pi.offset + local,
                    0.0,
                ));
            }
        }
        let n_pos = pool.iter().filter(|ex| ex.label > 0).count();
        println!(
            "{} pooled {} examples ({} positive)",
            "[LOG]".bold().green(),
            pool.len(),
            n_pos,
        );

        Ok(Self {
            config,
            bank,
            images,
            pager,
            pool,
            n_pos,
            rng,
            cascade: Cascade::new(
                config.base_width,
                config.base_height,
                config.n_thresholds,
            ),
            scored_stages: 0,
        })
    }

    fn boost(&mut self, source: &impl ImageSource) -> Result<()> {
        self.build_norm_stage()?;
        self.cascade.save(&self.config.cascade_path)?;

        let mut next_remask = 2usize;
        let mut interval = 2usize;
        for round in 1..self.config.n_rounds {
            let weights: Vec<f64> = self.pool.iter().map(|ex| ex.weight).collect();
            let counts = importance_sample(&weights, self.config.n_sampled, &mut self.rng);
            let selected = select_feature(
                &self.bank,
                &self.pool,
                &counts,
                self.config.n_thresholds,
            );
            println!(
                "{} round {round}: separation {:.6} over {} cuts",
                "[LOG]".bold().green(),
                selected.split.score,
                selected.split.cuts.len(),
            );

            let (thresholds, delta_scores) = build_stage_table(
                &selected.pos_hist,
                &selected.neg_hist,
                &selected.split.cuts,
                selected.min_val,
                selected.max_val,
                self.pool.len(),
            );
            let mut stage = Stage::new(
                Feature::Rects(selected.feature.clone()),
                thresholds,
                delta_scores,
                f32::MIN,
            );
            stage.min_pos_score_th = self.apply_stage(&stage, &selected.feature);
            self.cascade.stages.push(stage);
            self.cascade.save(&self.config.cascade_path)?;

            if round == next_remask && round + 1 < self.config.n_rounds {
                self.remask(source)?;
                interval = (interval * 2).min(self.config.max_remask_interval);
                next_remask = round + interval;
            }
        }
        Ok(())
    }

    /// Round zero: a stage on the window-contrast pseudo-feature, with
    /// the class-balancing initial score folded into its delta table.
    fn build_norm_stage(&mut self) -> Result<()> {
        let init_score = equalizing_score(self.n_pos, self.pool.len() - self.n_pos);
        for ex in &mut self.pool {
            ex.score = init_score;
            ex.reweight();
        }

        let mut min_val = f32::INFINITY;
        let mut max_val = f32::NEG_INFINITY;
        for ex in &self.pool {
            min_val = min_val.min(ex.inv_norm);
            max_val = max_val.max(ex.inv_norm);
        }
        if !(max_val > min_val) {
            return Err(Error::InvalidConfig(
                "window contrast is constant across the pool".into(),
            ));
        }
        let inv_step = (NUM_HIST_BIN - 1) as f32 / (max_val - min_val);
        let mut pos = vec![0.0f64; NUM_HIST_BIN];
        let mut neg = vec![0.0f64; NUM_HIST_BIN];
        for ex in &self.pool {
            let bin = (((ex.inv_norm - min_val) * inv_step + 0.5) as usize)
                .min(NUM_HIST_BIN - 1);
            if ex.label > 0 {
                pos[bin] += ex.weight;
            } else {
                neg[bin] += ex.weight;
            }
        }
        let split = find_thresholds(&pos, &neg, self.config.n_thresholds);
        let (thresholds, mut delta_scores) = build_stage_table(
            &pos,
            &neg,
            &split.cuts,
            min_val,
            max_val,
            self.pool.len(),
        );
        for ds in &mut delta_scores {
            *ds += init_score;
        }

        let mut stage = Stage::new(Feature::Norm, thresholds, delta_scores, f32::MIN);
        let mut min_pos = f32::INFINITY;
        for ex in &mut self.pool {
            ex.score = stage.response(ex.inv_norm);
            ex.reweight();
            if ex.label > 0 {
                min_pos = min_pos.min(ex.score);
            }
        }
        stage.min_pos_score_th = min_pos;
        self.cascade.stages.push(stage);
        println!(
            "{} round 0: norm stage, init score {init_score:.4}",
            "[LOG]".bold().green(),
        );
        Ok(())
    }

    /// Add a freshly built stage's response to every pooled example and
    /// return the minimum cumulative score among positives.
    fn apply_stage(&mut self, stage: &Stage, feature: &RectFeature) -> f32 {
        let variants = pool_variants(feature, &self.pool);
        let mut min_pos = f32::INFINITY;
        for ex in &mut self.pool {
            let variant = variants[ex.rung].as_ref().unwrap();
            ex.score += stage.response(ex.eval(variant));
            ex.reweight();
            if ex.label > 0 {
                min_pos = min_pos.min(ex.score);
            }
        }
        min_pos
    }

    /// Bring the paged scores up to date with the newly added stages,
    /// then rebuild the pool's negative half: drop the lowest-scored
    /// negatives past a running rejection threshold and keep a uniform
    /// subsample of the rest.
    fn remask(&mut self, source: &impl ImageSource) -> Result<()> {
        let TrainState {
            config,
            images,
            pager,
            pool,
            n_pos,
            rng,
            cascade,
            scored_stages,
            ..
        } = self;
        let config = *config;

        // fully rescaled copies of the new stages, one set per rung
        let mut rung_stages: Vec<Vec<Stage>> = Vec::with_capacity(MAX_NUM_SCALE);
        let mut scale = 1.0f32;
        for _ in 0..MAX_NUM_SCALE {
            rung_stages.push(
                cascade.stages[*scored_stages..]
                    .iter()
                    .map(|s| s.rescaled(scale))
                    .collect(),
            );
            scale *= config.step_scale;
        }

        let mut mass = [0.0f64; NUM_HIST_BIN];
        let mut count = [0usize; NUM_HIST_BIN];
        let hist_step = (NUM_HIST_BIN - 1) as f32 / (MAX_SCORE - MIN_SCORE);
        let bin_of = |score: f32| -> usize {
            let clamped = score.clamp(MIN_SCORE, MAX_SCORE);
            (((clamped - MIN_SCORE) * hist_step + 0.5) as usize).min(NUM_HIST_BIN - 1)
        };

        let mut cursor = ImageCursor::new(images, source, config);
        let mut failure: Option<Error> = None;
        pager.update_pass(|index, old| {
            if failure.is_some() {
                return old;
            }
            let (integral, window, label) = match cursor.at(index) {
                Ok(hit) => hit,
                Err(e) => {
                    failure = Some(e);
                    return old;
                },
            };
            if label == WindowLabel::Ignored || old <= MIN_SCORE {
                return old;
            }
            let inv_norm = integral.inv_norm(&window.rect);
            let mut score = old;
            let mut rejected = false;
            for stage in &rung_stages[window.rung] {
                score += stage.score(
                    integral,
                    window.rect.x_min,
                    window.rect.y_min,
                    inv_norm,
                );
                if score < stage.min_pos_score_th {
                    rejected = true;
                    break;
                }
            }
            if rejected {
                return MIN_SCORE;
            }
            let score = score.clamp(MIN_SCORE, MAX_SCORE);
            // a score pinned to the floor by clamping is as dead as a
            // rejected one; keep it out of the resampling histogram
            if label == WindowLabel::Negative && score > MIN_SCORE {
                let bin = bin_of(score);
                mass[bin] += super::example::logit_weight(-1, score);
                count[bin] += 1;
            }
            score
        })?;
        if let Some(e) = failure {
            return Err(e);
        }

        let in_histogram: usize = count.iter().sum();
        println!(
            "{} remask after stage {}: {} negatives still scored",
            "[LOG]".bold().green(),
            cascade.n_stages(),
            in_histogram,
        );
        *scored_stages = cascade.n_stages();
        if in_histogram == 0 {
            return Ok(());
        }

        let budget = config.max_examples - *n_pos;
        let (score_th, survivors) =
            remask_threshold(&mass, &count, budget, config.neg_rej_fraction);
        println!(
            "{} rejection threshold {score_th:.3}, {survivors} negatives above it",
            "[LOG]".bold().green(),
        );
        if survivors == 0 {
            return Ok(());
        }

        // exact uniform subsample of the survivors, as at pool seeding
        let mut left = survivors;
        let mut want = budget.min(survivors);
        let mut new_negs: Vec<TrainExample> = Vec::new();
        let mut cursor = ImageCursor::new(images, source, config);
        let mut failure: Option<Error> = None;
        pager.read_pass(|index, score| {
            if failure.is_some() || left == 0 {
                return;
            }
            let (integral, window, label) = match cursor.at(index) {
                Ok(hit) => hit,
                Err(e) => {
                    failure = Some(e);
                    return;
                },
            };
            if label != WindowLabel::Negative || score <= score_th {
                return;
            }
            let take = rng.gen_range(0..left) < want;
            left -= 1;
            if !take {
                return;
            }
            want -= 1;
            new_negs.push(TrainExample::from_window(
                integral,
                &window.rect,
                window.rung,
                window.scale,
                config.base_width,
                config.base_height,
                -1,
                index,
                score,
            ));
        })?;
        if let Some(e) = failure {
            return Err(e);
        }

        pool.retain(|ex| ex.label > 0);
        pool.append(&mut new_negs);
        println!(
            "{} pool rebuilt: {} examples ({} positive)",
            "[LOG]".bold().green(),
            pool.len(),
            n_pos,
        );
        Ok(())
    }

    fn finish(self) -> Result<Cascade> {
        self.pager.remove_files()?;
        Ok(self.cascade)
    }
}

/// Per-rung weight-rescaled copies of a feature, indexed by rung.
fn pool_variants(feature: &RectFeature, pool: &[TrainExample]) -> Vec<Option<RectFeature>> {
    let mut variants: Vec<Option<RectFeature>> = vec![None; MAX_NUM_SCALE];
    for ex in pool {
        if variants[ex.rung].is_none() {
            variants[ex.rung] = Some(feature.rescaled_weights_only(ex.scale));
        }
    }
    variants
}

/// Walk the negative-score histogram from the bottom and derive the
/// score below which negatives are dropped outright. Rejection stops
/// once the dropped bins hold `rej_fraction` of the total weight, or
/// once the remainder fits `budget`; the stopping bin itself survives.
/// Returns the threshold and the count of negatives scoring above it.
fn remask_threshold(
    mass: &[f64; NUM_HIST_BIN],
    count: &[usize; NUM_HIST_BIN],
    budget: usize,
    rej_fraction: f32,
) -> (f32, usize) {
    let total_mass: f64 = mass.iter().sum();
    let total_count: usize = count.iter().sum();
    let target = total_mass * f64::from(rej_fraction);

    let mut dropped_mass = 0.0f64;
    let mut dropped = 0usize;
    let mut cut_bin = 0usize;
    for bin in 0..NUM_HIST_BIN {
        dropped_mass += mass[bin];
        dropped += count[bin];
        cut_bin = bin;
        if dropped_mass > target || total_count - dropped < budget {
            break;
        }
    }
    dropped -= count[cut_bin];

    let step = (MAX_SCORE - MIN_SCORE) / (NUM_HIST_BIN - 1) as f32;
    let th = MIN_SCORE + (step * (cut_bin as f32 - 0.5)).max(0.0);
    (th, total_count - dropped)
}

/// The constant score at which the total logistic weight of `n_pos`
/// positives equals that of `n_neg` negatives. Folded into the first
/// stage so boosting starts from balanced classes.
fn equalizing_score(n_pos: usize, n_neg: usize) -> f32 {
    let (p, n) = (n_pos as f64, n_neg as f64);
    let mut lo = f64::from(MIN_SCORE);
    let mut hi = f64::from(MAX_SCORE);
    for _ in 0..60 {
        let mid = 0.5 * (lo + hi);
        let pos_mass = p / (1.0 + mid.exp());
        let neg_mass = n / (1.0 + (-mid).exp());
        if pos_mass > neg_mass {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (0.5 * (lo + hi)) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::GrayImage;
    use crate::train::example::{logit_weight, MemoryImageSource};

    use std::fs;
    use std::path::PathBuf;

    #[test]
    fn equalizing_score_balances_the_classes() {
        let s = equalizing_score(10, 990);
        let pos_mass = 10.0 * logit_weight(1, s);
        let neg_mass = 990.0 * logit_weight(-1, s);
        assert!(
            (pos_mass - neg_mass).abs() < 1e-6,
            "expected balanced masses, got {pos_mass} vs {neg_mass}",
        );
        assert!(s < 0.0, "rare positives need a negative prior");
        assert!(equalizing_score(100, 100).abs() < 1e-6);
    }

    const HIST_STEP: f32 = (MAX_SCORE - MIN_SCORE) / (NUM_HIST_BIN - 1) as f32;

    #[test]
    fn remask_threshold_drops_low_bins_until_the_budget_fits() {
        let mut mass = [0.0f64; NUM_HIST_BIN];
        let mut count = [0usize; NUM_HIST_BIN];
        for (bin, n) in [(10usize, 50usize), (100, 30), (200, 20)] {
            mass[bin] = n as f64;
            count[bin] = n;
        }
        // the weight target never trips at rej_fraction 1; the walk
        // stops once the 50 negatives above bin 10 fit the budget
        let (th, survivors) = remask_threshold(&mass, &count, 40, 1.0);
        assert_eq!(survivors, 50, "expected 50 survivors, got {survivors}");
        let expect = MIN_SCORE + HIST_STEP * 99.5;
        assert!(
            (th - expect).abs() < 1e-3,
            "expected threshold {expect}, got {th}",
        );
    }

    #[test]
    fn remask_threshold_honors_the_weight_target() {
        let mut mass = [0.0f64; NUM_HIST_BIN];
        let mut count = [0usize; NUM_HIST_BIN];
        for (bin, m) in [(0usize, 5.0f64), (50, 3.0), (150, 2.0)] {
            mass[bin] = m;
            count[bin] = 100;
        }
        // dropping bin 0 leaves the 60% weight target unmet; bin 50
        // overshoots it, so bin 50 and everything above survives
        let (th, survivors) = remask_threshold(&mass, &count, 50, 0.6);
        assert_eq!(survivors, 200, "expected 200 survivors, got {survivors}");
        let expect = MIN_SCORE + HIST_STEP * 49.5;
        assert!(
            (th - expect).abs() < 1e-3,
            "expected threshold {expect}, got {th}",
        );
    }

    #[test]
    fn remask_threshold_keeps_everything_that_fits() {
        let mut mass = [0.0f64; NUM_HIST_BIN];
        let mut count = [0usize; NUM_HIST_BIN];
        mass[30] = 20.0;
        count[30] = 20;
        let (th, survivors) = remask_threshold(&mass, &count, 100, 0.0);
        assert_eq!(survivors, 20);
        assert_eq!(th, MIN_SCORE, "a non-binding walk must not reject");
    }

    /// A textured background with a bright square face at `(cx, cy)`.
    fn face_image(w: usize, h: usize, cx: i32, cy: i32, side: i32) -> GrayImage {
        let mut img = GrayImage::filled(w, h, 0);
        for y in 0..h {
            for x in 0..w {
                img.set(x, y, ((x * 11 + y * 17) % 64) as u8);
            }
        }
        for y in (cy - side / 2).max(0)..(cy + side / 2).min(h as i32) {
            for x in (cx - side / 2).max(0)..(cx + side / 2).min(w as i32) {
                img.set(x as usize, y as usize, 220);
            }
        }
        img
    }

    /// Landmarks whose derived box is a ~23px square centered on
    /// `(cx, cy)`.
    fn face_record(cx: f32, cy: f32) -> String {
        format!(
            "leye {{{},{}}}\treye {{{},{}}}\tnose {{{},{}}}\tlmouth {{{},{}}}\trmouth {{{},{}}}",
            cx - 5.0, cy - 5.0,
            cx + 5.0, cy - 5.0,
            cx, cy,
            cx - 4.0, cy + 5.0,
            cx + 4.0, cy + 5.0,
        )
    }

    fn training_fixture(tag: &str) -> (TrainConfig, MemoryImageSource, PathBuf) {
        let dir = std::env::temp_dir().join(format!("cascadet_train_{tag}"));
        fs::create_dir_all(&dir).unwrap();
        let label = format!(
            "3\nface_a.raw\n1\n1\n{}\nface_b.raw\n1\n1\n{}\nempty.raw\n0\n",
            face_record(20.0, 20.0),
            face_record(22.0, 20.0),
        );
        fs::write(dir.join("label.txt"), label).unwrap();

        let mut source = MemoryImageSource::new();
        source.insert(dir.join("face_a.raw"), face_image(44, 44, 20, 20, 22));
        source.insert(dir.join("face_b.raw"), face_image(44, 44, 22, 20, 22));
        source.insert(dir.join("empty.raw"), face_image(48, 48, -100, -100, 0));

        let config = TrainConfig {
            label_dirs: vec![dir.clone()],
            score_file_prefix: dir.join("scores_"),
            cascade_path: dir.join("cascade.txt"),
            base_width: 24,
            base_height: 24,
            n_thresholds: 3,
            n_rounds: 4,
            max_examples: 200,
            n_sampled: 120,
            step_size: 0.1,
            step_scale: 1.25,
            min_feature_size: 4,
            feature_step_fraction: 0.5,
            feature_scale_step: 1.5,
            n_random_features: 0,
            score_page_size: 256,
            max_remask_interval: 64,
            neg_rej_fraction: 0.0,
            seed: Some(11),
        };
        (config, source, dir)
    }

    #[test]
    fn training_produces_a_soft_cascade() {
        let (config, source, dir) = training_fixture("full");
        let cascade = Trainer::init(config.clone()).run(&source).unwrap();

        assert_eq!(cascade.n_stages(), config.n_rounds);
        assert_eq!(cascade.base_width, 24);
        assert!(
            matches!(cascade.stages[0].feature, Feature::Norm),
            "round zero must train on window contrast",
        );
        for stage in &cascade.stages[1..] {
            assert!(matches!(stage.feature, Feature::Rects(_)));
        }

        // the per-round save must load back as the final cascade
        let reloaded = Cascade::load(&config.cascade_path).unwrap();
        assert_eq!(reloaded.n_stages(), cascade.n_stages());

        // every base-scale positive window clears every rejection
        // threshold: pooled base-scale patches evaluate identically to
        // the source image, and the thresholds are minima over positives
        for name in ["face_a.raw", "face_b.raw"] {
            let gray = source.load(&dir.join(name)).unwrap();
            let integral = NormIntegral::from_image(&gray);
            let windows = scan_windows(44, 44, 24, 24, 0.1, 1.25);
            let infos = read_label_file(dir.join("label.txt"), &dir).unwrap();
            let info = infos.iter().find(|i| i.path.ends_with(name)).unwrap();
            let labels = label_windows(info, &windows, 0.1, 1.25);
            for (w, l) in windows.iter().zip(&labels) {
                if *l != WindowLabel::Positive || w.rung != 0 {
                    continue;
                }
                let trace = cascade.score_trace(&integral, &w.rect);
                for (cum, stage) in trace.iter().zip(&cascade.stages) {
                    assert!(
                        *cum >= stage.min_pos_score_th,
                        "a training positive fell below a rejection threshold",
                    );
                }
            }
        }

        // score pages are cleaned up after a successful run
        assert!(!config.score_file_prefix.with_file_name("scores_000.dat").exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn training_without_positives_is_rejected() {
        let dir = std::env::temp_dir().join("cascadet_train_nopos");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("label.txt"), "1\nempty.raw\n0\n").unwrap();
        let mut source = MemoryImageSource::new();
        source.insert(dir.join("empty.raw"), face_image(48, 48, -100, -100, 0));

        let (mut config, _, fixture_dir) = training_fixture("nopos_cfg");
        config.label_dirs = vec![dir.clone()];
        config.score_file_prefix = dir.join("scores_");
        config.cascade_path = dir.join("cascade.txt");

        let err = Trainer::init(config).run(&source).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        fs::remove_dir_all(&dir).ok();
        fs::remove_dir_all(&fixture_dir).ok();
    }
}
