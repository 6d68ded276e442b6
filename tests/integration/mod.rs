//! Property tests for the coordinate convention and the splice primitive.

mod coordinates;
mod splice;
