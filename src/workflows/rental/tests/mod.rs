mod booking;
mod common;
mod matching;
mod schedule;
