mod recognizer;

pub use recognizer::{
    RecognizerStats, Sample, ShakeRecognizer, ShakeWindow, TripleShake, GRAVITY_EARTH,
};
