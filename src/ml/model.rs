// ============================================================
// Layer 5 — Network Architectures
// ============================================================
// Two feed-forward classifiers over a flat feature row, both
// built from the same hidden-width list and dropout rate:
//
//   DenseNet
//     x ─► [Linear ─► ReLU ─► Dropout] × L ─► Linear(4)
//
//   ResidualNet
//     x ─► Linear(w0) ─► ReLU
//        ─► ResidualBlock(w0 → w0)
//        ─► ResidualBlock(w0 → w1)
//        ─► …
//        ─► ResidualBlock(wL-2 → wL-1) ─► Linear(4)
//
//   ResidualBlock(a → b)
//     h    = Linear(b) ─► ReLU ─► Dropout ─► Linear(b)
//     skip = x                     if a == b
//          = Linear(b)(x)          otherwise (projection)
//     out  = ReLU(h + skip)
//
// Both emit raw logits; softmax lives in the loss and in the
// evaluation argmax. The PhaseNetwork trait is what the trainer
// and the estimator are generic over.

use burn::{
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::relu,
};
use serde::{Deserialize, Serialize};

use crate::domain::phase::Phase;
use crate::ml::boosting::BoostingConfig;

/// A model that maps `[batch, n_features]` rows to `[batch, 4]` logits.
pub trait PhaseNetwork<B: Backend>: Module<B> {
    fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2>;
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct NetworkConfig {
    pub input_width: usize,
    pub layers:      Vec<usize>,
    pub dropout:     f64,
    #[config(default = 4)]
    pub num_classes: usize,
}

impl NetworkConfig {
    pub fn init_dense<B: Backend>(&self, device: &B::Device) -> DenseNet<B> {
        let mut hidden = Vec::with_capacity(self.layers.len());
        let mut width  = self.input_width;
        for &next in &self.layers {
            hidden.push(LinearConfig::new(width, next).init(device));
            width = next;
        }
        DenseNet {
            hidden,
            head:    LinearConfig::new(width, self.num_classes).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }

    pub fn init_residual<B: Backend>(&self, device: &B::Device) -> ResidualNet<B> {
        let first = self.layers.first().copied().unwrap_or(self.input_width);
        let stem  = LinearConfig::new(self.input_width, first).init(device);

        let mut blocks = Vec::with_capacity(self.layers.len());
        let mut width  = first;
        for &next in &self.layers {
            blocks.push(self.build_block(width, next, device));
            width = next;
        }

        ResidualNet {
            stem,
            blocks,
            head: LinearConfig::new(width, self.num_classes).init(device),
        }
    }

    fn build_block<B: Backend>(&self, from: usize, to: usize, device: &B::Device) -> ResidualBlock<B> {
        ResidualBlock {
            fc1:      LinearConfig::new(from, to).init(device),
            fc2:      LinearConfig::new(to, to).init(device),
            shortcut: (from != to).then(|| LinearConfig::new(from, to).init(device)),
            dropout:  DropoutConfig::new(self.dropout).init(),
        }
    }
}

// ─── Dense ────────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct DenseNet<B: Backend> {
    pub hidden:  Vec<Linear<B>>,
    pub head:    Linear<B>,
    pub dropout: Dropout,
}

impl<B: Backend> PhaseNetwork<B> for DenseNet<B> {
    fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = features;
        for layer in &self.hidden {
            x = self.dropout.forward(relu(layer.forward(x)));
        }
        self.head.forward(x)
    }
}

// ─── Residual ─────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    pub fc1:      Linear<B>,
    pub fc2:      Linear<B>,
    pub shortcut: Option<Linear<B>>,
    pub dropout:  Dropout,
}

impl<B: Backend> ResidualBlock<B> {
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let h = self.dropout.forward(relu(self.fc1.forward(x.clone())));
        let h = self.fc2.forward(h);
        let skip = match &self.shortcut {
            Some(projection) => projection.forward(x),
            None             => x,
        };
        relu(h + skip)
    }
}

#[derive(Module, Debug)]
pub struct ResidualNet<B: Backend> {
    pub stem:   Linear<B>,
    pub blocks: Vec<ResidualBlock<B>>,
    pub head:   Linear<B>,
}

impl<B: Backend> PhaseNetwork<B> for ResidualNet<B> {
    fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = relu(self.stem.forward(features));
        for block in &self.blocks {
            x = block.forward(x);
        }
        self.head.forward(x)
    }
}

// ─── Model specification ──────────────────────────────────────────────────────

/// Which family of model a run builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkKind {
    Dense,
    Residual,
}

/// Everything needed to rebuild a model before loading its weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSpec {
    Dense(NetworkConfig),
    Residual(NetworkConfig),
    BoostedTrees(BoostingConfig),
}

impl ModelSpec {
    pub fn network(kind: NetworkKind, config: NetworkConfig) -> Self {
        match kind {
            NetworkKind::Dense    => ModelSpec::Dense(config),
            NetworkKind::Residual => ModelSpec::Residual(config),
        }
    }

    /// The network kind and config, or None for boosted trees
    pub fn as_network(&self) -> Option<(NetworkKind, &NetworkConfig)> {
        match self {
            ModelSpec::Dense(c)        => Some((NetworkKind::Dense, c)),
            ModelSpec::Residual(c)     => Some((NetworkKind::Residual, c)),
            ModelSpec::BoostedTrees(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModelSpec::Dense(_)        => "dense",
            ModelSpec::Residual(_)     => "residual",
            ModelSpec::BoostedTrees(_) => "boosted",
        }
    }
}

/// Human-readable model summary printed before training.
pub fn summary<B: Backend, M: Module<B>>(kind: NetworkKind, config: &NetworkConfig, model: &M) -> String {
    let mut widths = vec![config.input_width.to_string()];
    widths.extend(config.layers.iter().map(|w| w.to_string()));
    widths.push(config.num_classes.to_string());

    format!(
        "Model: {:?} network\n  widths:  {}\n  dropout: {}\n  outputs: {}\n  params:  {}",
        kind,
        widths.join(" → "),
        config.dropout,
        Phase::labels().join(", "),
        model.num_params(),
    )
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn config() -> NetworkConfig {
        NetworkConfig::new(6, vec![8, 8, 4], 0.1)
    }

    #[test]
    fn test_dense_output_shape() {
        let device = Default::default();
        let model  = config().init_dense::<TestBackend>(&device);
        let x      = Tensor::<TestBackend, 2>::zeros([5, 6], &device);
        assert_eq!(model.forward(x).dims(), [5, 4]);
        assert_eq!(model.hidden.len(), 3);
    }

    #[test]
    fn test_residual_output_shape_and_projections() {
        let device = Default::default();
        let model  = config().init_residual::<TestBackend>(&device);
        let x      = Tensor::<TestBackend, 2>::ones([3, 6], &device);
        assert_eq!(model.forward(x).dims(), [3, 4]);

        // 8→8 and 8→8 are identity shortcuts, 8→4 needs a projection
        let projections: Vec<bool> = model.blocks.iter().map(|b| b.shortcut.is_some()).collect();
        assert_eq!(projections, vec![false, false, true]);
    }

    #[test]
    fn test_parameter_count() {
        let device = Default::default();
        let model  = NetworkConfig::new(3, vec![2], 0.0).init_dense::<TestBackend>(&device);
        // (3*2 + 2) + (2*4 + 4)
        assert_eq!(model.num_params(), 20);
    }

    #[test]
    fn test_model_spec_json_keeps_kind() {
        let spec = ModelSpec::network(NetworkKind::Residual, config());
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("residual"));

        let back: ModelSpec = serde_json::from_str(&json).unwrap();
        let (kind, cfg) = back.as_network().unwrap();
        assert_eq!(kind, NetworkKind::Residual);
        assert_eq!(cfg.layers, vec![8, 8, 4]);
        assert_eq!(cfg.num_classes, 4);
    }

    #[test]
    fn test_summary_mentions_widths() {
        let device = Default::default();
        let cfg    = config();
        let model  = cfg.init_dense::<TestBackend>(&device);
        let text   = summary::<TestBackend, _>(NetworkKind::Dense, &cfg, &model);
        assert!(text.contains("6 → 8 → 8 → 4 → 4"));
        assert!(text.contains("params"));
    }
}
