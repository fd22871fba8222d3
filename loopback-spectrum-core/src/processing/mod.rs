pub mod bands;
pub mod fft_analyzer;
pub mod window;
