pub mod decode;
pub mod pcm;
pub mod source;
pub mod stream;
