mod breakpoints;
mod lifecycle;
mod program;
mod protocol;
mod stepping;
