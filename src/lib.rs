//! # AVIF Block Encoder
//!
//! Encodes 8- and 10-bit RGB/RGBA images into an AVIF-style container by
//! splitting every plane into independent blocks and coding them on a
//! bounded worker pool.
//!
//! The output is an ISOBMFF box tree with the private `avbk` brand. Its
//! payload is this crate's block codec, so AVIF decoders will not open it;
//! use [`read_container`] to inspect it.
//!
//! This library is organized into several modules:
//! - `utils`: Error handling and the block work scheduler
//! - `image`: Input pixel buffers, loading and resizing, plane extraction
//! - `encode`: Configuration, rate control, block transforms and entropy coding
//! - `container`: Box writing and bitstream assembly
//!
//! ```no_run
//! use avif_block_encoder::{Encoder, Image};
//!
//! let image = Image::from_rgba8(2, 1, vec![255, 0, 0, 255, 0, 0, 255, 128])?;
//! let encoded = Encoder::new().with_quality(70.0).with_speed(6).encode_image(&image)?;
//! encoded.bitstream.write_to(std::fs::File::create("out.avbk")?)?;
//! # Ok::<(), avif_block_encoder::EncodeError>(())
//! ```

pub mod utils {
    pub mod error;
    pub mod threads;
}

pub mod image {
    pub mod convert;
    pub mod pixel_buffer;
    pub mod planes;
}

pub mod encode {
    pub mod alpha;
    pub mod config;
    pub mod encoder;
    pub mod partition;
    pub mod rate;

    pub mod entropy {
        pub mod bool_coder;
        pub mod coeff_coder;
    }

    pub mod block {
        pub mod coder;
        pub mod dct;
        pub mod quant;
        pub mod transform;
    }

    pub use self::encoder::{encode, EncodedImage, Encoder};
}

pub mod container {
    pub mod boxes;
    pub mod muxer;

    pub use self::muxer::{read_container, Bitstream, BitstreamMuxer, ContainerInfo};
}

// Public API exports
pub use container::{read_container, Bitstream, ContainerInfo};
pub use encode::alpha::AlphaColorMode;
pub use encode::block::coder::BlockMode;
pub use encode::config::EncodeConfig;
pub use encode::{encode, EncodedImage, Encoder};
pub use crate::image::pixel_buffer::{ChannelLayout, Image, PixelBuffer, SampleDepth};
pub use crate::image::planes::ColorModel;
pub use utils::error::{EncodeError, Result};
