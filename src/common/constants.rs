//! Contains the numerical constants of the neural network potential, and the device designation.





// Random number generation
pub const DEFAULT_SEED: u64 = 1314;                // Seed of the generator used for weight initialization





// Neural network
pub const DEFAULT_INPUT_LENGTH: usize = 20;                // Length of the fingerprint (e.g. 20 Behler-Parrinello symmetry functions)
pub const DEFAULT_N_LAYERS: usize = 3;
pub const DEFAULT_HIDDEN_SIZE: usize = 10;
pub const DEFAULT_OUTPUT_SIZE: usize = 1;                // A scalar atomic energy contribution

// Kaiming-uniform initialization with the gain recommended for tanh
pub const TANH_GAIN: f64 = 5.0 / 3.0;

pub const LEAKY_RELU_SLOPE: f64 = 0.01;





// Forces
pub const N_FORCE_COMPONENT: usize = 3;                // x, y, z





// Persistence
pub const SAVEFILE_VERSION: u32 = 0;





// The device (CPU or Cuda) where the tensors are placed
#[cfg(not(feature = "cuda"))]
pub type Device = dfdx::tensor::Cpu;
#[cfg(feature = "cuda")]
pub type Device = dfdx::tensor::Cuda;

/// The tape recording the operations of a forward pass, for the reverse pass of the external optimizer
pub type GradTape = dfdx::tensor::OwnedTape<f64, Device>;
