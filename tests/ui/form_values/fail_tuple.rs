#![allow(dead_code)]

#[derive(inform::form::FormValues)]
struct Pair(String, String);

fn main() {}
