mod propagation;
mod sampling;
