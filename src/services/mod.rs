pub mod id3tag;
pub mod process;
pub mod youtube_dl;
