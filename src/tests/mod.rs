mod figure_welding_test;
mod orchestrator_test;
