use crate::target::Target;
use tch::{Device, Tensor};

/// Splits `(image, target)` pairs into two parallel sequences. Nothing is
/// stacked since the number of instances differs between samples.
pub fn collate(samples: Vec<(Tensor, Target)>) -> (Vec<Tensor>, Vec<Target>) {
    samples.into_iter().unzip()
}

/// A collated batch together with the dataset indices it was built from.
#[derive(Debug)]
pub struct Batch {
    pub indices: Vec<usize>,
    pub images: Vec<Tensor>,
    pub targets: Vec<Target>,
}

impl Batch {
    pub fn new(indices: Vec<usize>, samples: Vec<(Tensor, Target)>) -> Self {
        let (images, targets) = collate(samples);
        Self {
            indices,
            images,
            targets,
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn total_instances(&self) -> i64 {
        self.targets.iter().map(Target::num_instances).sum()
    }

    #[allow(clippy::wrong_self_convention)]
    pub fn to_device(self, device: Device) -> Batch {
        if device == Device::Cpu {
            return self;
        }
        Batch {
            indices: self.indices,
            images: self.images.iter().map(|t| t.to_device(device)).collect(),
            targets: self.targets.iter().map(|t| t.to_device(device)).collect(),
        }
    }
}
